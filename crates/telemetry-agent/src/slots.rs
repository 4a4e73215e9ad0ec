// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed, statically indexed storage for the sample set.
//!
//! Every index is bound to one metric name when the array is built. The
//! runtime range comes first and ends with `RandomValue` and `PollCount`,
//! followed by the host range: `TotalMemory`, `FreeMemory` and one
//! `CPUutilization<N>` gauge per logical CPU (numbered from 1).

use telemetry_core::{Metric, MetricKind};

pub const RESIDENT_MEMORY: usize = 0;
pub const VIRTUAL_MEMORY: usize = 1;
pub const PROCESS_CPU: usize = 2;
pub const DISK_READ_BYTES: usize = 3;
pub const DISK_WRITTEN_BYTES: usize = 4;
pub const RUN_TIME: usize = 5;
pub const RUNTIME_WORKERS: usize = 6;
pub const ALIVE_TASKS: usize = 7;
pub const GLOBAL_QUEUE_DEPTH: usize = 8;
pub const RANDOM_VALUE: usize = 9;
pub const POLL_COUNT: usize = 10;
pub const TOTAL_MEMORY: usize = 11;
pub const FREE_MEMORY: usize = 12;
/// Index of `CPUutilization1`.
pub const CPU_BASE: usize = 13;

const FIXED_SLOTS: [(&str, MetricKind); CPU_BASE] = [
    ("ResidentMemory", MetricKind::Gauge),
    ("VirtualMemory", MetricKind::Gauge),
    ("ProcessCPU", MetricKind::Gauge),
    ("DiskReadBytes", MetricKind::Gauge),
    ("DiskWrittenBytes", MetricKind::Gauge),
    ("RunTime", MetricKind::Gauge),
    ("RuntimeWorkers", MetricKind::Gauge),
    ("AliveTasks", MetricKind::Gauge),
    ("GlobalQueueDepth", MetricKind::Gauge),
    ("RandomValue", MetricKind::Gauge),
    ("PollCount", MetricKind::Counter),
    ("TotalMemory", MetricKind::Gauge),
    ("FreeMemory", MetricKind::Gauge),
];

#[derive(Debug, Clone)]
pub struct SlotArray {
    slots: Box<[Metric]>,
}

impl SlotArray {
    #[must_use]
    pub fn new(cpu_count: usize) -> Self {
        let fixed = FIXED_SLOTS
            .iter()
            .map(|(id, kind)| Metric::empty(*id, *kind));
        let cpus = (1..=cpu_count)
            .map(|n| Metric::empty(format!("CPUutilization{n}"), MetricKind::Gauge));
        SlotArray {
            slots: fixed.chain(cpus).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn cpu_count(&self) -> usize {
        self.slots.len() - CPU_BASE
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Metric> {
        self.slots.get(index)
    }

    /// Stores a gauge reading. Returns false when the index is outside the
    /// array or bound to a counter.
    pub fn set_gauge(&mut self, index: usize, value: f64) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.kind == MetricKind::Gauge => {
                slot.value = Some(value);
                true
            }
            _ => false,
        }
    }

    pub fn set_counter(&mut self, index: usize, delta: i64) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.kind == MetricKind::Counter => {
                slot.delta = Some(delta);
                true
            }
            _ => false,
        }
    }

    /// Index of the `n`-th CPU gauge, counting from zero.
    #[must_use]
    pub fn cpu_slot(&self, n: usize) -> Option<usize> {
        let index = CPU_BASE + n;
        (index < self.slots.len()).then_some(index)
    }

    /// Copies of every slot that holds a reading.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Metric> {
        self.slots.iter().filter(|m| m.has_data()).cloned().collect()
    }
}
