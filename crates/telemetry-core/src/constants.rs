// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Batch submission path on the collector.
pub const UPDATES_PATH: &str = "/updates/";

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
