// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Routes of the collector's HTTP surface.
//!
//! | method | path | storage operation |
//! |---|---|---|
//! | POST | `/updates/` | `put_batch` (JSON array) |
//! | POST | `/update/` | `put` (JSON metric), answers the merged metric |
//! | POST | `/update/{type}/{id}/{value}` | `put` |
//! | POST | `/value/` | `get` (JSON `{id, type}`), answers the metric |
//! | GET | `/value/{type}/{id}` | `get`, answers the bare value |
//! | GET | `/` | `list`, answers an HTML page |
//! | GET | `/ping` | `ping` |
//!
//! When a key is configured and a request carries a signature, the
//! signature is checked over the decompressed body before routing and is
//! echoed on successful responses.

use crate::http_utils::{
    create_http_response, log_and_create_http_response, read_body, HttpResponse,
    APPLICATION_JSON, MAX_REQUEST_CONTENT_LENGTH, TEXT_HTML, TEXT_PLAIN,
};
use bytes::Bytes;
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Method, Request, StatusCode};
use std::error::Error;
use std::fmt::Write;
use std::sync::Arc;
use telemetry_core::signing::{self, SIGNATURE_HEADER};
use telemetry_core::{Metric, MetricKind};
use telemetry_store::{Storage, StorageError};
use tracing::debug;

#[derive(Clone)]
pub struct Handlers {
    storage: Arc<dyn Storage>,
    key: Option<Arc<str>>,
    max_body_size: usize,
}

fn storage_error_response(context: &str, err: &StorageError) -> HttpResponse {
    let status = if err.is_server_fault() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else if matches!(err, StorageError::NotFound { .. }) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    };
    log_and_create_http_response(&format!("{context}: {err}"), status)
}

fn json_response(metric: &Metric) -> HttpResponse {
    match serde_json::to_vec(metric) {
        Ok(body) => create_http_response(StatusCode::OK, APPLICATION_JSON, body),
        Err(e) => log_and_create_http_response(
            &format!("Unable to encode metric: {e}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl Handlers {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, key: Option<String>) -> Self {
        Handlers {
            storage,
            key: key.map(Arc::from),
            max_body_size: MAX_REQUEST_CONTENT_LENGTH,
        }
    }

    /// Caps request bodies, compressed or not, at `max_body_size` bytes.
    #[must_use]
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = match read_body(&parts.headers, body, self.max_body_size).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let signature = match self.verify_signature(&parts.headers, &body) {
            Ok(signature) => signature,
            Err(response) => return response,
        };

        let mut response = self.route(&parts.method, parts.uri.path(), body).await;

        if let Some(signature) = signature {
            if response.status().as_u16() < 300 {
                if let Ok(value) = HeaderValue::from_str(&signature) {
                    response.headers_mut().insert(SIGNATURE_HEADER, value);
                }
            }
        }
        response
    }

    /// The verified signature, if there was one to verify.
    fn verify_signature(
        &self,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<Option<String>, HttpResponse> {
        let Some(key) = self.key.as_deref() else {
            return Ok(None);
        };
        let Some(signature) = headers.get(SIGNATURE_HEADER) else {
            return Ok(None);
        };
        if body.is_empty() {
            return Ok(None);
        }
        let Ok(signature) = signature.to_str() else {
            return Err(log_and_create_http_response(
                "Malformed signature header",
                StatusCode::BAD_REQUEST,
            ));
        };
        match signing::verify(body, key, signature) {
            Ok(()) => Ok(Some(signature.to_string())),
            Err(e) => Err(log_and_create_http_response(
                &format!("Signature check failed: {e}"),
                StatusCode::BAD_REQUEST,
            )),
        }
    }

    async fn route(&self, method: &Method, path: &str, body: Bytes) -> HttpResponse {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (&Method::POST, ["updates"]) => self.update_batch(&body).await,
            (&Method::POST, ["update"]) => self.update_json(&body).await,
            (&Method::POST, ["update", kind, id, value]) => {
                self.update_path(kind, id, value).await
            }
            (&Method::POST, ["value"]) => self.value_json(&body).await,
            (&Method::GET, ["value", kind, id]) => self.value_text(kind, id).await,
            (&Method::GET, [""]) => self.list_html().await,
            (&Method::GET, ["ping"]) => self.ping().await,
            _ => log_and_create_http_response(
                &format!("No route for {method} {path}"),
                StatusCode::NOT_FOUND,
            ),
        }
    }

    async fn update_batch(&self, body: &[u8]) -> HttpResponse {
        let metrics: Vec<Metric> = match serde_json::from_slice(body) {
            Ok(metrics) => metrics,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Unable to decode batch: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        let n_metrics = metrics.len();
        match self.storage.put_batch(metrics).await {
            Ok(()) => {
                debug!("Stored batch of {n_metrics} metrics");
                create_http_response(StatusCode::OK, TEXT_PLAIN, Bytes::new())
            }
            // a rejected batch is reported to the client whatever the cause
            Err(e) => log_and_create_http_response(
                &format!("Unable to store batch: {e}"),
                StatusCode::BAD_REQUEST,
            ),
        }
    }

    async fn update_json(&self, body: &[u8]) -> HttpResponse {
        let metric: Metric = match serde_json::from_slice(body) {
            Ok(metric) => metric,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Unable to decode metric: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        match self.storage.put(metric).await {
            Ok(merged) => json_response(&merged),
            Err(e) => storage_error_response("Unable to store metric", &e),
        }
    }

    async fn update_path(&self, kind: &str, id: &str, value: &str) -> HttpResponse {
        let metric = match Metric::parse(kind, id, value) {
            Ok(metric) => metric,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Invalid metric: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        match self.storage.put(metric).await {
            Ok(merged) => create_http_response(StatusCode::OK, TEXT_PLAIN, merged.to_string()),
            Err(e) => storage_error_response("Unable to store metric", &e),
        }
    }

    async fn value_json(&self, body: &[u8]) -> HttpResponse {
        let query: Metric = match serde_json::from_slice(body) {
            Ok(query) => query,
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Unable to decode query: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        match self.storage.get(&query).await {
            Ok(metric) => json_response(&metric),
            Err(e) => storage_error_response("Unable to fetch metric", &e),
        }
    }

    async fn value_text(&self, kind: &str, id: &str) -> HttpResponse {
        // an unknown kind cannot name a stored metric
        let Ok(kind) = kind.parse::<MetricKind>() else {
            return log_and_create_http_response(
                &format!("Unknown metric type {kind:?}"),
                StatusCode::NOT_FOUND,
            );
        };
        match self.storage.get(&Metric::empty(id, kind)).await {
            Ok(metric) => create_http_response(
                StatusCode::OK,
                TEXT_PLAIN,
                metric.value_string().unwrap_or_default(),
            ),
            Err(e) => storage_error_response("Unable to fetch metric", &e),
        }
    }

    async fn list_html(&self) -> HttpResponse {
        let mut metrics = match self.storage.list().await {
            Ok(metrics) => metrics,
            Err(e) => return storage_error_response("Unable to list metrics", &e),
        };
        metrics.sort_by(|a, b| a.id.cmp(&b.id));

        let mut page = String::from("<html><head><title>Metrics</title></head><body><ul>\n");
        for metric in &metrics {
            let _ = writeln!(page, "<li>{}</li>", escape_html(&metric.to_string()));
        }
        page.push_str("</ul></body></html>\n");
        create_http_response(StatusCode::OK, TEXT_HTML, page)
    }

    async fn ping(&self) -> HttpResponse {
        match self.storage.ping().await {
            Ok(()) => create_http_response(
                StatusCode::OK,
                TEXT_PLAIN,
                "The connection is established!",
            ),
            Err(e) => storage_error_response("Storage is unavailable", &e),
        }
    }
}
