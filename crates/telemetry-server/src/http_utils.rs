// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};
use serde_json::json;
use std::error::Error;
use telemetry_core::compression::{gunzip, GZIP_ENCODING};
use telemetry_core::DecompressError;
use tracing::{debug, error, warn};

pub type HttpResponse = Response<Full<Bytes>>;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

/// Upper bound for a request body, before and after decompression.
pub const MAX_REQUEST_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

pub fn create_http_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Logs the message (debug for success, warn for client errors, error for
/// server errors) and returns it as `{"message": message}`.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> HttpResponse {
    if status.is_success() {
        debug!("{message}");
    } else if status.is_client_error() {
        warn!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    create_http_response(status, APPLICATION_JSON, body)
}

/// Reads the whole request body, decompressing it when the request declares
/// `Content-Encoding: gzip`. Bodies larger than `max_length` bytes, on the
/// wire or once inflated, are answered with 413.
pub async fn read_body<B>(
    headers: &HeaderMap,
    body: B,
    max_length: usize,
) -> Result<Bytes, HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn Error + Send + Sync>>,
{
    let raw = match Limited::new(body, max_length).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Err(log_and_create_http_response(
                &format!("Request body exceeds {max_length} bytes"),
                StatusCode::PAYLOAD_TOO_LARGE,
            ))
        }
        Err(e) => {
            return Err(log_and_create_http_response(
                &format!("Unable to read request body: {e}"),
                StatusCode::BAD_REQUEST,
            ))
        }
    };

    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case(GZIP_ENCODING));
    if !gzipped {
        return Ok(raw);
    }
    gunzip(&raw, max_length).map(Bytes::from).map_err(|e| {
        let status = match e {
            DecompressError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DecompressError::Io(_) => StatusCode::BAD_REQUEST,
        };
        log_and_create_http_response(&format!("Unable to decompress request body: {e}"), status)
    })
}
