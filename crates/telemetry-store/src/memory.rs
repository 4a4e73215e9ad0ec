// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::StorageError;
use crate::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use telemetry_core::Metric;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Keeps the latest state of every metric in a map guarded by one
/// reader/writer lock. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemStore {
    items: RwLock<HashMap<String, Metric>>,
}

impl MemStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemStore {
    async fn put(&self, metric: Metric) -> Result<Metric, StorageError> {
        metric.validate()?;
        let mut items = self.items.write().await;
        let stored = items.get(&metric.id);
        let merged = metric.merged_onto(stored)?;
        items.insert(merged.id.clone(), merged.clone());
        Ok(merged)
    }

    async fn get(&self, query: &Metric) -> Result<Metric, StorageError> {
        let items = self.items.read().await;
        items
            .get(&query.id)
            .filter(|stored| stored.kind == query.kind)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                id: query.id.clone(),
                kind: query.kind,
            })
    }

    async fn list(&self) -> Result<Vec<Metric>, StorageError> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn put_batch(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        for metric in &metrics {
            metric.validate()?;
        }
        let n_metrics = metrics.len();
        let mut items = self.items.write().await;
        // merged into a staging map first so a rejected element applies nothing
        let mut staged: HashMap<String, Metric> = HashMap::with_capacity(n_metrics);
        for metric in metrics {
            let stored = staged.get(&metric.id).or_else(|| items.get(&metric.id));
            let merged = metric.merged_onto(stored)?;
            staged.insert(merged.id.clone(), merged);
        }
        items.extend(staged);
        debug!("Stored batch of {n_metrics} metrics");
        Ok(())
    }

    async fn close(&self) {
        info!("Memory storage is closed");
    }
}
