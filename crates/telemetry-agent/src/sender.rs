// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::AgentConfig;
use crate::errors::SendError;
use crate::pipeline::SharedState;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::Arc;
use telemetry_core::compression::{self, GZIP_ENCODING};
use telemetry_core::signing::{self, SIGNATURE_HEADER};
use telemetry_core::BackoffPolicy;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Posts compressed, optionally signed batches to the collector.
pub struct Transmitter {
    client: reqwest::Client,
    url: String,
    key: Option<String>,
    backoff: BackoffPolicy,
}

impl Transmitter {
    pub fn new(config: &AgentConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(SendError::Client)?;
        Ok(Transmitter {
            client,
            url: config.updates_url(),
            key: config.key.clone(),
            backoff: BackoffPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sends one serialized batch. Only transport failures are retried; any
    /// response, whatever its status, ends the attempt.
    pub async fn send(&self, payload: &[u8]) -> Result<StatusCode, SendError> {
        let body = compression::gzip(payload)?;
        // signed over the uncompressed body
        let signature = self.key.as_deref().map(|key| signing::sign(payload, key));

        let response = self
            .backoff
            .retry(
                || {
                    let mut request = self
                        .client
                        .post(&self.url)
                        .header(CONTENT_TYPE, "application/json")
                        .header(CONTENT_ENCODING, GZIP_ENCODING)
                        .body(body.clone());
                    if let Some(signature) = &signature {
                        request = request.header(SIGNATURE_HEADER, signature);
                    }
                    request.send()
                },
                |_: &reqwest::Error| true,
            )
            .await?;
        Ok(response.status())
    }
}

/// Drains the shared queue until it is closed and empty. Returns the number
/// of batches the collector answered.
pub async fn run_worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Vec<u8>>>>,
    transmitter: Arc<Transmitter>,
    state: SharedState,
) -> u64 {
    let mut sent = 0;
    loop {
        let payload = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some(payload) = payload else {
            break;
        };

        let time = Instant::now();
        match transmitter.send(&payload).await {
            Ok(status) => {
                if status.is_success() {
                    debug!(
                        "Worker {id} | Sent batch in {} ms",
                        time.elapsed().as_millis()
                    );
                } else {
                    warn!("Worker {id} | Collector answered with status {status}");
                }
                // last write wins; a tick landing during the send is lost
                state.lock().await.poll_count = 0;
                sent += 1;
            }
            Err(e) => error!("Worker {id} | Dropping batch: {e}"),
        }
    }
    debug!("Worker {id} stopped after {sent} batches");
    sent
}
