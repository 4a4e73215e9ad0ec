// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampler and collector coordination.
//!
//! The Sampler owns the tick. On every tick it locks the shared state, bumps
//! the poll count, draws a fresh random value and then lends the held guard
//! to each collector in turn through a [`TickLease`]. A collector writes its
//! slots and hands the guard back, so every collector sees every tick exactly
//! once inside the critical section that updated the counter, and the next
//! tick cannot start until the slowest collector is done.

use crate::slots::SlotArray;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
pub struct PipelineState {
    pub slots: SlotArray,
    /// Ticks since the last batch the collector answered.
    pub poll_count: i64,
    pub random_value: f64,
    pub finish: bool,
}

impl PipelineState {
    #[must_use]
    pub fn new(cpu_count: usize) -> Self {
        PipelineState {
            slots: SlotArray::new(cpu_count),
            poll_count: 0,
            random_value: 0.0,
            finish: false,
        }
    }
}

pub type SharedState = Arc<Mutex<PipelineState>>;

/// Exclusive access to the pipeline state for one tick.
pub struct TickLease {
    guard: OwnedMutexGuard<PipelineState>,
    done: oneshot::Sender<OwnedMutexGuard<PipelineState>>,
}

impl TickLease {
    pub fn state(&mut self) -> &mut PipelineState {
        &mut self.guard
    }

    /// Hands the guard back to the Sampler.
    pub fn release(self) {
        // the Sampler re-locks if it is gone
        let _ = self.done.send(self.guard);
    }
}

/// Fills one disjoint range of the slot array.
#[async_trait]
pub trait Collector: Send {
    fn name(&self) -> &'static str;

    async fn collect(&mut self, state: &mut PipelineState);
}

/// Runs `collector` on every lease until the Sampler signals finish.
pub async fn run_collector(
    mut collector: Box<dyn Collector>,
    mut leases: mpsc::Receiver<TickLease>,
) {
    let name = collector.name();
    while let Some(mut lease) = leases.recv().await {
        if lease.state().finish {
            lease.release();
            break;
        }
        collector.collect(lease.state()).await;
        lease.release();
    }
    debug!("Collector {name} stopped");
}

pub struct Sampler {
    state: SharedState,
    collectors: Vec<mpsc::Sender<TickLease>>,
    interval: Duration,
    rng: StdRng,
}

impl Sampler {
    #[must_use]
    pub fn new(
        state: SharedState,
        collectors: Vec<mpsc::Sender<TickLease>>,
        interval: Duration,
    ) -> Self {
        Sampler {
            state,
            collectors,
            interval,
            rng: StdRng::from_entropy(),
        }
    }

    /// Ticks until cancelled and returns the number of ticks taken.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                    ticks += 1;
                }
            }
        }
        self.finish().await;
        debug!("Sampler stopped after {ticks} ticks");
        ticks
    }

    async fn tick(&mut self) {
        let mut guard = Arc::clone(&self.state).lock_owned().await;
        guard.poll_count += 1;
        guard.random_value = self.rng.gen();
        self.lend(guard).await;
    }

    async fn finish(&self) {
        let mut guard = Arc::clone(&self.state).lock_owned().await;
        guard.finish = true;
        self.lend(guard).await;
    }

    /// Passes the guard through every collector, one at a time.
    async fn lend(&self, mut guard: OwnedMutexGuard<PipelineState>) {
        for collector in &self.collectors {
            let (done, returned) = oneshot::channel();
            guard = match collector.send(TickLease { guard, done }).await {
                Ok(()) => match returned.await {
                    Ok(guard) => guard,
                    // collector dropped the lease; the lock is free again
                    Err(_) => Arc::clone(&self.state).lock_owned().await,
                },
                Err(mpsc::error::SendError(lease)) => lease.guard,
            };
        }
    }
}
