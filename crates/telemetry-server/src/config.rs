// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use crate::http_utils::MAX_REQUEST_CONTENT_LENGTH;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use telemetry_core::constants::DEFAULT_ADDRESS;
use telemetry_store::StorageConfig;

const DEFAULT_STORE_INTERVAL_SECS: u64 = 300;
const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/metrics-db.json";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub address: String,
    /// Shared secret for request signatures.
    pub key: Option<String>,
    /// Snapshot cadence; zero writes through on every mutation.
    pub store_interval: Duration,
    pub file_storage_path: Option<PathBuf>,
    pub restore: bool,
    pub database_dsn: Option<String>,
    /// Largest accepted request body, compressed or decompressed.
    pub max_request_content_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: DEFAULT_ADDRESS.to_string(),
            key: None,
            store_interval: Duration::from_secs(DEFAULT_STORE_INTERVAL_SECS),
            file_storage_path: Some(PathBuf::from(DEFAULT_FILE_STORAGE_PATH)),
            restore: true,
            database_dsn: None,
            max_request_content_length: MAX_REQUEST_CONTENT_LENGTH,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Result<ServerConfig, ConfigError> {
        let defaults = ServerConfig::default();

        let store_interval = match env::var("STORE_INTERVAL") {
            Ok(raw) => {
                let secs = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: "STORE_INTERVAL",
                        value: raw.clone(),
                    })?;
                // non-positive means write-through
                Duration::from_secs(u64::try_from(secs).unwrap_or(0))
            }
            Err(_) => defaults.store_interval,
        };

        // an explicitly empty path disables the file backend
        let file_storage_path = match env::var("FILE_STORAGE_PATH") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => defaults.file_storage_path,
        };

        let restore = match env::var("RESTORE") {
            Ok(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "RESTORE",
                        value: raw,
                    })
                }
            },
            Err(_) => defaults.restore,
        };

        let config = ServerConfig {
            address: non_empty("ADDRESS").unwrap_or(defaults.address),
            key: non_empty("KEY"),
            store_interval,
            file_storage_path,
            restore,
            database_dsn: non_empty("DATABASE_DSN"),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.address.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "address {:?} is not host:port",
                self.address
            )));
        }
        Ok(())
    }

    /// Relational when a DSN is set, else file-checkpointed when a path is
    /// set, else memory.
    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        if let Some(dsn) = &self.database_dsn {
            return StorageConfig::Database { dsn: dsn.clone() };
        }
        if let Some(path) = &self.file_storage_path {
            return StorageConfig::File {
                path: path.clone(),
                interval: self.store_interval,
                restore: self.restore,
            };
        }
        StorageConfig::Memory
    }
}
