// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),

    #[error("failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),

    #[error("failed to send payload: {0}")]
    Transport(#[from] reqwest::Error),
}
