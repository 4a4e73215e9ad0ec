// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::DecompressError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

pub const GZIP_ENCODING: &str = "gzip";

pub fn gzip(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

/// Decompresses `payload`, refusing output larger than `limit` bytes. Reading
/// stops one byte past the limit, so a gzip bomb is never fully inflated.
pub fn gunzip(payload: &[u8], limit: usize) -> Result<Vec<u8>, DecompressError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = GzDecoder::new(payload).take(cap);
    let mut out = Vec::with_capacity(payload.len().saturating_mul(2).min(limit));
    decoder.read_to_end(&mut out)?;
    if out.len() > limit {
        return Err(DecompressError::TooLarge { limit });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_header_and_restore() {
        let payload = br#"[{"id":"Alloc","type":"gauge","value":12.5}]"#;
        let compressed = gzip(payload).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert_eq!(gunzip(&compressed, 1024).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_gunzip_rejects_plain_payload() {
        assert!(matches!(
            gunzip(b"{\"id\":\"x\"}", 1024),
            Err(DecompressError::Io(_))
        ));
    }

    #[test]
    fn test_gunzip_stops_at_limit() {
        let inflated = vec![b' '; 1 << 20];
        let bomb = gzip(&inflated).unwrap();
        assert!(bomb.len() < 16 * 1024);
        assert!(matches!(
            gunzip(&bomb, 64 * 1024),
            Err(DecompressError::TooLarge { limit: 65536 })
        ));
        assert_eq!(gunzip(&bomb, inflated.len()).unwrap().len(), inflated.len());
    }
}
