// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collectors::{HostCollector, RuntimeCollector};
use crate::config::AgentConfig;
use crate::errors::SendError;
use crate::pipeline::{run_collector, Collector, PipelineState, Sampler, SharedState};
use crate::reporter::Reporter;
use crate::sender::{run_worker, Transmitter};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Counters returned once every task of a run has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub batches_enqueued: u64,
    pub batches_sent: u64,
}

pub struct Agent {
    config: AgentConfig,
    state: SharedState,
    collectors: Vec<Box<dyn Collector>>,
    transmitter: Arc<Transmitter>,
}

impl Agent {
    /// An agent with the runtime and host collectors.
    pub fn new(config: AgentConfig) -> Result<Self, SendError> {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(RuntimeCollector::new()),
            Box::new(HostCollector::new(config.cpu_sample_window)),
        ];
        Self::with_collectors(config, collectors)
    }

    pub fn with_collectors(
        config: AgentConfig,
        collectors: Vec<Box<dyn Collector>>,
    ) -> Result<Self, SendError> {
        let transmitter = Arc::new(Transmitter::new(&config)?);
        Ok(Self::with_transmitter(config, collectors, transmitter))
    }

    #[must_use]
    pub fn with_transmitter(
        config: AgentConfig,
        collectors: Vec<Box<dyn Collector>>,
        transmitter: Arc<Transmitter>,
    ) -> Self {
        let state = Arc::new(Mutex::new(PipelineState::new(num_cpus::get())));
        Agent {
            config,
            state,
            collectors,
            transmitter,
        }
    }

    #[must_use]
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Runs the pipeline until `cancel` fires, then waits for the Sampler,
    /// every collector, the Reporter and every send worker to stop. Batches
    /// already queued are sent before the workers exit.
    pub async fn run(self, cancel: CancellationToken) -> RunSummary {
        let Agent {
            config,
            state,
            collectors,
            transmitter,
        } = self;

        let mut collector_tasks = JoinSet::new();
        let mut lease_senders = Vec::with_capacity(collectors.len());
        for collector in collectors {
            let (tx, rx) = mpsc::channel(1);
            lease_senders.push(tx);
            collector_tasks.spawn(run_collector(collector, rx));
        }
        let sampler = tokio::spawn(
            Sampler::new(Arc::clone(&state), lease_senders, config.poll_interval)
                .run(cancel.clone()),
        );

        let (queue_tx, queue_rx) = mpsc::channel(config.rate_limit);
        let reporter = tokio::spawn(
            Reporter::new(Arc::clone(&state), queue_tx, config.report_interval)
                .run(cancel.clone()),
        );

        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let mut workers = JoinSet::new();
        for id in 0..config.rate_limit {
            workers.spawn(run_worker(
                id,
                Arc::clone(&queue_rx),
                Arc::clone(&transmitter),
                Arc::clone(&state),
            ));
        }
        info!(
            "Agent started: reporting to {} with {} workers",
            config.updates_url(),
            config.rate_limit
        );

        let mut summary = RunSummary::default();
        match sampler.await {
            Ok(ticks) => summary.ticks = ticks,
            Err(e) => error!("Sampler task failed: {e}"),
        }
        while let Some(result) = collector_tasks.join_next().await {
            if let Err(e) = result {
                error!("Collector task failed: {e}");
            }
        }
        match reporter.await {
            Ok(enqueued) => summary.batches_enqueued = enqueued,
            Err(e) => error!("Reporter task failed: {e}"),
        }
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(sent) => summary.batches_sent += sent,
                Err(e) => error!("Send worker failed: {e}"),
            }
        }
        debug!("Agent stopped: {summary:?}");
        summary
    }
}
