// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Memory storage checkpointed to a JSON snapshot file.
//!
//! The snapshot is a JSON array of metrics in the wire representation. With a
//! zero interval every successful write is followed by a snapshot; otherwise a
//! [`crate::Checkpointer`] drives [`FileStore::dump`] on the interval and
//! [`Storage::close`] writes one last snapshot.

use crate::errors::StorageError;
use crate::memory::MemStore;
use crate::{PeriodicFlush, Storage};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telemetry_core::{BackoffPolicy, Metric};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct FileStore {
    memory: MemStore,
    path: PathBuf,
    interval: Duration,
    backoff: BackoffPolicy,
    // serializes snapshots so a later dump never loses to an earlier one
    dump_lock: Mutex<()>,
    dumps: AtomicU64,
    closed: AtomicBool,
}

fn is_retryable(err: &io::Error) -> bool {
    err.kind() != io::ErrorKind::PermissionDenied
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        FileStore {
            memory: MemStore::new(),
            path: path.into(),
            interval,
            backoff: BackoffPolicy::default(),
            dump_lock: Mutex::new(()),
            dumps: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_write_through(&self) -> bool {
        self.interval.is_zero()
    }

    /// Number of snapshots written so far.
    #[must_use]
    pub fn dump_count(&self) -> u64 {
        self.dumps.load(Ordering::Relaxed)
    }

    /// Loads the snapshot file, replaying every entry through the merge rule.
    /// A missing or unreadable-by-permission file is a cold start.
    pub async fn restore(&self) -> Result<usize, StorageError> {
        let read = self
            .backoff
            .retry(
                || tokio::fs::read(&self.path),
                |e: &io::Error| {
                    !matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                    )
                },
            )
            .await;
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) =>
            {
                debug!("No snapshot restored from {}: {e}", self.path.display());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let metrics: Vec<Metric> = serde_json::from_slice(&bytes)?;
        let mut restored = 0;
        for metric in metrics {
            match self.memory.put(metric).await {
                Ok(_) => restored += 1,
                Err(e) => warn!("Skipping snapshot entry: {e}"),
            }
        }
        Ok(restored)
    }

    /// Writes the current contents to the snapshot file.
    pub async fn dump(&self) -> Result<(), StorageError> {
        let _guard = self.dump_lock.lock().await;
        let snapshot = self.memory.list().await?;
        let bytes = serde_json::to_vec(&snapshot)?;
        self.backoff
            .retry(|| tokio::fs::write(&self.path, &bytes), is_retryable)
            .await?;
        self.dumps.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Wrote snapshot of {} metrics to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn after_write(&self) -> Result<(), StorageError> {
        if self.is_write_through() {
            self.dump().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStore {
    async fn put(&self, metric: Metric) -> Result<Metric, StorageError> {
        let merged = self.memory.put(metric).await?;
        self.after_write().await?;
        Ok(merged)
    }

    async fn get(&self, query: &Metric) -> Result<Metric, StorageError> {
        self.memory.get(query).await
    }

    async fn list(&self) -> Result<Vec<Metric>, StorageError> {
        self.memory.list().await
    }

    async fn put_batch(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        self.memory.put_batch(metrics).await?;
        self.after_write().await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.dump().await {
            Ok(()) => info!("Final snapshot written to {}", self.path.display()),
            Err(e) => warn!("Final snapshot to {} failed: {e}", self.path.display()),
        }
    }

    fn periodic_flush(self: Arc<Self>) -> Option<Arc<dyn PeriodicFlush>> {
        if self.is_write_through() {
            None
        } else {
            Some(self)
        }
    }
}

#[async_trait]
impl PeriodicFlush for FileStore {
    fn flush_interval(&self) -> Duration {
        self.interval
    }

    async fn flush(&self) -> Result<(), StorageError> {
        self.dump().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::MetricKind;

    async fn read_snapshot(path: &Path) -> Vec<Metric> {
        let bytes = tokio::fs::read(path).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_write_through_persists_every_put() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = FileStore::new(&path, Duration::ZERO);

        store.put(Metric::counter("c", 2)).await.unwrap();
        assert_eq!(store.dump_count(), 1);
        store.put(Metric::counter("c", 3)).await.unwrap();
        assert_eq!(store.dump_count(), 2);

        assert_eq!(read_snapshot(&path).await, vec![Metric::counter("c", 5)]);
    }

    #[tokio::test]
    async fn test_interval_mode_defers_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = FileStore::new(&path, Duration::from_secs(300));

        store.put(Metric::gauge("g", 1.0)).await.unwrap();
        assert_eq!(store.dump_count(), 0);
        assert!(!path.exists());

        store.dump().await.unwrap();
        assert_eq!(read_snapshot(&path).await, vec![Metric::gauge("g", 1.0)]);
    }

    #[tokio::test]
    async fn test_restore_replays_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        tokio::fs::write(
            &path,
            r#"[{"id":"c","type":"counter","delta":4},{"id":"g","type":"gauge","value":0.5}]"#,
        )
        .await
        .unwrap();

        let store = FileStore::new(&path, Duration::from_secs(300));
        assert_eq!(store.restore().await.unwrap(), 2);
        store.put(Metric::counter("c", 1)).await.unwrap();

        let counter = store
            .get(&Metric::empty("c", MetricKind::Counter))
            .await
            .unwrap();
        assert_eq!(counter.delta, Some(5));
        let gauge = store
            .get(&Metric::empty("g", MetricKind::Gauge))
            .await
            .unwrap();
        assert_eq!(gauge.value, Some(0.5));
    }

    #[tokio::test]
    async fn test_restore_missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"), Duration::ZERO);
        assert_eq!(store.restore().await.unwrap(), 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = FileStore::new(&path, Duration::ZERO);
        assert!(matches!(
            store.restore().await,
            Err(StorageError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_close_dumps_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        let store = FileStore::new(&path, Duration::from_secs(300));
        store.put(Metric::gauge("g", 3.0)).await.unwrap();

        store.close().await;
        store.close().await;
        assert_eq!(store.dump_count(), 1);
        assert_eq!(read_snapshot(&path).await, vec![Metric::gauge("g", 3.0)]);
    }

    #[tokio::test]
    async fn test_write_through_has_no_periodic_flush() {
        let store = Arc::new(FileStore::new("/tmp/unused.json", Duration::ZERO));
        assert!(store.periodic_flush().is_none());
    }
}
