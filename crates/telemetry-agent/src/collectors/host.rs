// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host memory and per-CPU utilization.

use crate::pipeline::{Collector, PipelineState};
use crate::slots;
use async_trait::async_trait;
use std::time::Duration;
use sysinfo::System;
use tracing::debug;

pub struct HostCollector {
    system: System,
    /// Time between the two CPU readings that make up one sample.
    window: Duration,
}

impl HostCollector {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        HostCollector {
            system: System::new(),
            window: window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }
}

#[async_trait]
impl Collector for HostCollector {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn collect(&mut self, state: &mut PipelineState) {
        self.system.refresh_memory();
        state
            .slots
            .set_gauge(slots::TOTAL_MEMORY, self.system.total_memory() as f64);
        state
            .slots
            .set_gauge(slots::FREE_MEMORY, self.system.free_memory() as f64);

        self.system.refresh_cpu_usage();
        tokio::time::sleep(self.window).await;
        self.system.refresh_cpu_usage();

        for (n, cpu) in self.system.cpus().iter().enumerate() {
            match state.slots.cpu_slot(n) {
                Some(index) => {
                    state.slots.set_gauge(index, f64::from(cpu.cpu_usage()));
                }
                None => {
                    debug!("No slot for CPU {}", n + 1);
                    break;
                }
            }
        }
    }
}
