// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;
use telemetry_core::{Metric, MetricKind};
use telemetry_store::{Checkpointer, FileStore, Storage, StorageConfig, StorageError};
use tokio_util::sync::CancellationToken;

async fn backends(dir: &tempfile::TempDir) -> Vec<(&'static str, Arc<dyn Storage>)> {
    let memory = StorageConfig::Memory.open().await.unwrap();
    let file = StorageConfig::File {
        path: dir.path().join("snapshot.json"),
        interval: Duration::ZERO,
        restore: false,
    }
    .open()
    .await
    .unwrap();
    let database = StorageConfig::Database {
        dsn: format!("sqlite://{}", dir.path().join("metrics.db").display()),
    }
    .open()
    .await
    .unwrap();
    vec![("memory", memory), ("file", file), ("database", database)]
}

#[tokio::test]
async fn every_backend_applies_the_merge_rule() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        store.put(Metric::counter("requests", 5)).await.unwrap();
        store.put(Metric::counter("requests", 3)).await.unwrap();
        store.put(Metric::gauge("temp", 1.5)).await.unwrap();
        store.put(Metric::gauge("temp", 2.75)).await.unwrap();

        let counter = store
            .get(&Metric::empty("requests", MetricKind::Counter))
            .await
            .unwrap();
        assert_eq!(counter.delta, Some(8), "{name}");
        let gauge = store
            .get(&Metric::empty("temp", MetricKind::Gauge))
            .await
            .unwrap();
        assert_eq!(gauge.value, Some(2.75), "{name}");

        let mut listed = store.list().await.unwrap();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(
            listed,
            vec![Metric::counter("requests", 8), Metric::gauge("temp", 2.75)],
            "{name}"
        );
        store.close().await;
    }
}

#[tokio::test]
async fn every_backend_rejects_empty_and_invalid_batches() {
    let dir = tempfile::tempdir().unwrap();
    for (name, store) in backends(&dir).await {
        let err = store
            .put(Metric::empty("PollCount", MetricKind::Counter))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)), "{name}");

        let err = store
            .put_batch(vec![
                Metric::counter("c1", 1),
                Metric::empty("g1", MetricKind::Gauge),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)), "{name}");
        assert!(store.list().await.unwrap().is_empty(), "{name}");

        store
            .put_batch(vec![
                Metric::counter("c1", 1),
                Metric::gauge("g1", 4.0),
                Metric::counter("c1", 2),
            ])
            .await
            .unwrap();
        let counter = store
            .get(&Metric::empty("c1", MetricKind::Counter))
            .await
            .unwrap();
        assert_eq!(counter.delta, Some(3), "{name}");
        store.close().await;
    }
}

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::File {
        path: dir.path().join("snapshot.json"),
        interval: Duration::from_secs(300),
        restore: true,
    };

    let store = config.open().await.unwrap();
    store.put(Metric::counter("c", 4)).await.unwrap();
    store.put(Metric::gauge("g", 0.5)).await.unwrap();
    store.close().await;

    let reopened = config.open().await.unwrap();
    reopened.put(Metric::counter("c", 1)).await.unwrap();
    let counter = reopened
        .get(&Metric::empty("c", MetricKind::Counter))
        .await
        .unwrap();
    assert_eq!(counter.delta, Some(5));
    let gauge = reopened
        .get(&Metric::empty("g", MetricKind::Gauge))
        .await
        .unwrap();
    assert_eq!(gauge.value, Some(0.5));
}

#[tokio::test]
async fn database_backend_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::Database {
        dsn: format!("sqlite://{}", dir.path().join("metrics.db").display()),
    };

    let store = config.open().await.unwrap();
    store.put(Metric::counter("c", 4)).await.unwrap();
    store.close().await;

    let reopened = config.open().await.unwrap();
    let merged = reopened.put(Metric::counter("c", 6)).await.unwrap();
    assert_eq!(merged.delta, Some(10));
    reopened.close().await;
}

#[tokio::test(start_paused = true)]
async fn checkpointer_snapshots_on_interval() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(
        dir.path().join("snapshot.json"),
        Duration::from_secs(5),
    ));
    store.put(Metric::gauge("g", 1.0)).await.unwrap();

    let flush = store.clone().periodic_flush().unwrap();
    let checkpointer = Checkpointer::start(flush, CancellationToken::new());
    tokio::time::sleep(Duration::from_secs(11)).await;
    checkpointer.stop().await;
    assert_eq!(store.dump_count(), 2);

    // stop, then close: exactly one more snapshot
    store.close().await;
    assert_eq!(store.dump_count(), 3);
}
