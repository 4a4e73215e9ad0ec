// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Slow mock collector that records batches and tracks concurrent requests.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_core::compression::gunzip;
use telemetry_core::signing::{verify, SIGNATURE_HEADER};
use telemetry_core::Metric;
use tokio::net::TcpListener;

#[derive(Default)]
struct Recorded {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    rejected: AtomicUsize,
    batches: Mutex<Vec<Vec<Metric>>>,
}

#[derive(Clone)]
pub struct MockCollector {
    pub addr: SocketAddr,
    recorded: Arc<Recorded>,
}

impl MockCollector {
    /// Start a mock collector on a random port that answers every batch
    /// after `latency`.
    pub async fn start(latency: Duration, key: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock collector");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let recorded = Arc::new(Recorded::default());
        let key = key.map(str::to_string);

        let server_recorded = recorded.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let io = TokioIo::new(stream);
                let recorded = server_recorded.clone();
                let key = key.clone();

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let recorded = recorded.clone();
                        let key = key.clone();
                        async move {
                            let now = recorded.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                            recorded.max_in_flight.fetch_max(now, Ordering::SeqCst);

                            let signature = req
                                .headers()
                                .get(SIGNATURE_HEADER)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes().to_vec())
                                .unwrap_or_default();
                            tokio::time::sleep(latency).await;

                            let payload = gunzip(&body, usize::MAX).expect("body is not gzip");
                            let valid = match (&key, &signature) {
                                (Some(key), Some(sig)) => verify(&payload, key, sig).is_ok(),
                                (Some(_), None) => false,
                                (None, _) => true,
                            };
                            let status = if valid {
                                let batch: Vec<Metric> =
                                    serde_json::from_slice(&payload).expect("body is not a batch");
                                recorded.batches.lock().unwrap().push(batch);
                                200
                            } else {
                                recorded.rejected.fetch_add(1, Ordering::SeqCst);
                                400
                            };

                            recorded.in_flight.fetch_sub(1, Ordering::SeqCst);
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::new()))
                        }
                    });

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockCollector { addr, recorded }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn batches(&self) -> Vec<Vec<Metric>> {
        self.recorded.batches.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.recorded.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> usize {
        self.recorded.rejected.load(Ordering::SeqCst)
    }
}
