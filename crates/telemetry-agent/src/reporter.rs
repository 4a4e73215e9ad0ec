// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::pipeline::SharedState;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Snapshots the slot array on its own clock and feeds the send queue.
///
/// A full queue blocks the Reporter, so slow transmission lowers the report
/// rate instead of dropping batches.
pub struct Reporter {
    state: SharedState,
    queue: mpsc::Sender<Vec<u8>>,
    interval: Duration,
}

impl Reporter {
    #[must_use]
    pub fn new(state: SharedState, queue: mpsc::Sender<Vec<u8>>, interval: Duration) -> Self {
        Reporter {
            state,
            queue,
            interval,
        }
    }

    /// Reports until cancelled and returns the number of batches enqueued.
    /// The queue is closed on return.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        let mut enqueued = 0;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let batch = {
                let state = self.state.lock().await;
                state.slots.snapshot()
            };
            if batch.is_empty() {
                debug!("Nothing sampled yet, skipping report");
                continue;
            }
            let payload = match serde_json::to_vec(&batch) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize batch: {e}");
                    continue;
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                sent = self.queue.send(payload) => {
                    if sent.is_err() {
                        debug!("Send queue closed, stopping reporter");
                        break;
                    }
                    enqueued += 1;
                    debug!("Enqueued batch of {} metrics", batch.len());
                }
            }
        }
        debug!("Reporter stopped after enqueuing {enqueued} batches");
        enqueued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineState;
    use crate::slots;
    use std::sync::Arc;
    use telemetry_core::Metric;
    use tokio::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_stalls_reporter() {
        let mut state = PipelineState::new(1);
        state.slots.set_counter(slots::POLL_COUNT, 1);
        let state = Arc::new(Mutex::new(state));
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let reporter = tokio::spawn(
            Reporter::new(state, tx, Duration::from_secs(1)).run(cancel.clone()),
        );

        // five ticks pass but only one batch fits and one is waiting to get in
        tokio::time::sleep(Duration::from_millis(5500)).await;
        cancel.cancel();
        let enqueued = reporter.await.unwrap();
        assert_eq!(enqueued, 1);

        let batch: Vec<Metric> = serde_json::from_slice(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(batch, vec![Metric::counter("PollCount", 1)]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_empty_snapshot() {
        let state = Arc::new(Mutex::new(PipelineState::new(1)));
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let reporter = tokio::spawn(
            Reporter::new(state, tx, Duration::from_secs(1)).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        assert_eq!(reporter.await.unwrap(), 0);
        assert!(rx.recv().await.is_none());
    }
}
