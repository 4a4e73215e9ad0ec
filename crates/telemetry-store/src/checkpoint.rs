// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::PeriodicFlush;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Drives a backend's periodic flush until cancelled.
pub struct Checkpointer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Checkpointer {
    /// The ticker stops when `cancel` (or [`Checkpointer::stop`]) fires; a
    /// flush that is already running is allowed to finish.
    #[must_use]
    pub fn start(target: Arc<dyn PeriodicFlush>, cancel: CancellationToken) -> Self {
        let period = target.flush_interval();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = target.flush().await {
                            warn!("Periodic flush failed: {e}");
                        }
                    }
                }
            }
            debug!("Checkpointer stopped");
        });
        Checkpointer { cancel, handle }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Checkpointer task failed: {e}");
        }
    }
}
