// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampling and reporting side of the telemetry pipeline.
//!
//! A [`pipeline::Sampler`] drives the [`pipeline::Collector`]s that fill the
//! [`slots::SlotArray`]; a [`reporter::Reporter`] snapshots it onto a bounded
//! queue drained by the send workers in [`sender`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod agent;
pub mod collectors;
pub mod config;
pub mod errors;
pub mod pipeline;
pub mod reporter;
pub mod sender;
pub mod slots;

pub use agent::{Agent, RunSummary};
pub use config::AgentConfig;
