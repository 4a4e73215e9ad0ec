// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::metric::MetricKind;

/// Rejected metric input. Never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricError {
    #[error("invalid metric type: {0}")]
    InvalidKind(String),

    #[error("invalid metric value: {0}")]
    InvalidValue(String),

    #[error("metric id is empty")]
    MissingId,

    #[error("{kind} metric {id} carries no value")]
    MissingValue { id: String, kind: MetricKind },

    #[error("metric {0} carries both delta and value")]
    BothValues(String),

    #[error("counter {0} would overflow")]
    Overflow(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecompressError {
    #[error("decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("invalid gzip payload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid hex: {0}")]
    Encoding(#[from] hex::FromHexError),

    #[error("signature mismatch")]
    Mismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MetricError::InvalidKind("histogram".to_string());
        assert_eq!(error.to_string(), "invalid metric type: histogram");

        let error = MetricError::MissingValue {
            id: "PollCount".to_string(),
            kind: MetricKind::Counter,
        };
        assert_eq!(error.to_string(), "counter metric PollCount carries no value");
    }
}
