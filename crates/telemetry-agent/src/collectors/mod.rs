// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod host;
pub mod runtime;

pub use host::HostCollector;
pub use runtime::RuntimeCollector;
