// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use telemetry_core::{MetricError, MetricKind};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Validation(#[from] MetricError),

    #[error("no such value in storage: {kind} {id}")]
    NotFound { id: String, kind: MetricKind },

    /// The retry budget for acquiring a live connection ran out.
    #[error("db connection error")]
    ConnectionUnavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Faults of the storage itself, as opposed to bad input or a missing id.
    #[must_use]
    pub fn is_server_fault(&self) -> bool {
        !matches!(
            self,
            StorageError::Validation(_) | StorageError::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StorageError::NotFound {
            id: "temp".to_string(),
            kind: MetricKind::Gauge,
        };
        assert_eq!(error.to_string(), "no such value in storage: gauge temp");
        assert!(!error.is_server_fault());
        assert!(StorageError::ConnectionUnavailable.is_server_fault());
    }
}
