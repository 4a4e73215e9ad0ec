// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process and async runtime statistics, plus the Sampler's poll count and
//! random value.

use crate::pipeline::{Collector, PipelineState};
use crate::slots;
use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::runtime::Handle;
use tracing::debug;

pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
    runtime: Option<Handle>,
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeCollector {
    #[must_use]
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!("Process statistics unavailable: {e}");
                None
            }
        };
        RuntimeCollector {
            system: System::new(),
            pid,
            runtime: Handle::try_current().ok(),
        }
    }

    fn collect_process(&mut self, state: &mut PipelineState) {
        let Some(pid) = self.pid else {
            return;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = self.system.process(pid) else {
            debug!("Process {pid} not found");
            return;
        };
        let disk = process.disk_usage();
        let sample = &mut state.slots;
        sample.set_gauge(slots::RESIDENT_MEMORY, process.memory() as f64);
        sample.set_gauge(slots::VIRTUAL_MEMORY, process.virtual_memory() as f64);
        sample.set_gauge(slots::PROCESS_CPU, f64::from(process.cpu_usage()));
        sample.set_gauge(slots::DISK_READ_BYTES, disk.total_read_bytes as f64);
        sample.set_gauge(slots::DISK_WRITTEN_BYTES, disk.total_written_bytes as f64);
        sample.set_gauge(slots::RUN_TIME, process.run_time() as f64);
    }

    fn collect_runtime(&self, state: &mut PipelineState) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let metrics = runtime.metrics();
        let sample = &mut state.slots;
        sample.set_gauge(slots::RUNTIME_WORKERS, metrics.num_workers() as f64);
        sample.set_gauge(slots::ALIVE_TASKS, metrics.num_alive_tasks() as f64);
        sample.set_gauge(slots::GLOBAL_QUEUE_DEPTH, metrics.global_queue_depth() as f64);
    }
}

#[async_trait]
impl Collector for RuntimeCollector {
    fn name(&self) -> &'static str {
        "runtime"
    }

    async fn collect(&mut self, state: &mut PipelineState) {
        self.collect_process(state);
        self.collect_runtime(state);
        let (poll_count, random_value) = (state.poll_count, state.random_value);
        state.slots.set_gauge(slots::RANDOM_VALUE, random_value);
        state.slots.set_counter(slots::POLL_COUNT, poll_count);
    }
}
