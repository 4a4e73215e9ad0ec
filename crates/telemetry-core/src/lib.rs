// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data model and wire helpers shared by the telemetry agent and collector.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod compression;
pub mod constants;
pub mod errors;
pub mod metric;
pub mod retry;
pub mod shutdown;
pub mod signing;

pub use errors::{DecompressError, MetricError};
pub use metric::{Metric, MetricKind};
pub use retry::BackoffPolicy;
