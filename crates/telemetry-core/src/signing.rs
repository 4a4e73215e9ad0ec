// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HMAC-SHA256 payload signatures carried in the `HashSHA256` header.
//!
//! Signatures are always computed over the uncompressed body.

use crate::errors::SignatureError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "HashSHA256";

#[allow(clippy::expect_used)]
fn mac(key: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size")
}

/// Hex-encoded HMAC-SHA256 of `payload` under `key`.
#[must_use]
pub fn sign(payload: &[u8], key: &str) -> String {
    let mut mac = mac(key);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded signature in constant time.
pub fn verify(payload: &[u8], key: &str, signature: &str) -> Result<(), SignatureError> {
    let expected = hex::decode(signature.trim())?;
    let mut mac = mac(key);
    mac.update(payload);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}
