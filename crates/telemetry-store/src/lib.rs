// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage engine for the collector side of the pipeline.
//!
//! Every backend honours the same contract: counters accumulate, gauges
//! are replaced, and a metric without data is never persisted. Backends that
//! need a background ticker expose it through [`Storage::periodic_flush`] and
//! are driven by a [`Checkpointer`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod checkpoint;
pub mod errors;
pub mod file;
pub mod memory;
pub mod sql;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::Metric;
use tracing::{info, warn};

pub use checkpoint::Checkpointer;
pub use errors::StorageError;
pub use file::FileStore;
pub use memory::MemStore;
pub use sql::SqlStore;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Merges `metric` into the stored state and returns the result.
    async fn put(&self, metric: Metric) -> Result<Metric, StorageError>;

    /// Looks up the stored metric with the query's id and kind.
    async fn get(&self, query: &Metric) -> Result<Metric, StorageError>;

    /// Every stored metric, in no particular order.
    async fn list(&self) -> Result<Vec<Metric>, StorageError>;

    /// Applies the metrics in order; nothing is stored if any of them fails.
    async fn put_batch(&self, metrics: Vec<Metric>) -> Result<(), StorageError>;

    /// Releases the backend. Safe to call more than once.
    async fn close(&self);

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Background work the backend wants run on a fixed interval.
    fn periodic_flush(self: Arc<Self>) -> Option<Arc<dyn PeriodicFlush>> {
        None
    }
}

#[async_trait]
pub trait PeriodicFlush: Send + Sync {
    fn flush_interval(&self) -> Duration;

    async fn flush(&self) -> Result<(), StorageError>;
}

/// Which backend to open, in the order it is preferred by configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Database {
        dsn: String,
    },
    File {
        path: PathBuf,
        /// `Duration::ZERO` persists after every write.
        interval: Duration,
        restore: bool,
    },
    Memory,
}

impl StorageConfig {
    /// Opens the configured backend. A failed restore is logged and the file
    /// backend starts empty.
    pub async fn open(&self) -> Result<Arc<dyn Storage>, StorageError> {
        match self {
            StorageConfig::Database { dsn } => {
                let store = SqlStore::connect(dsn).await?;
                info!("Using database storage");
                Ok(Arc::new(store))
            }
            StorageConfig::File {
                path,
                interval,
                restore,
            } => {
                let store = FileStore::new(path.clone(), *interval);
                if *restore {
                    match store.restore().await {
                        Ok(n) => info!("Restored {n} metrics from {}", path.display()),
                        Err(e) => warn!("Failed to restore metrics from {}: {e}", path.display()),
                    }
                }
                info!("Using file storage at {}", path.display());
                Ok(Arc::new(store))
            }
            StorageConfig::Memory => {
                info!("Using memory storage");
                Ok(Arc::new(MemStore::new()))
            }
        }
    }
}
