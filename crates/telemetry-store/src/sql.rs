// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Relational backend on SQLite.
//!
//! Gauges and counters live in two tables keyed by id. The merge rule is
//! expressed as an upsert so that the accumulate/replace happens inside the
//! database and the stored value comes back from the same statement.

use crate::errors::StorageError;
use crate::Storage;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Sqlite, SqliteConnection};
use std::str::FromStr;
use std::time::Duration;
use telemetry_core::{BackoffPolicy, Metric, MetricError, MetricKind};
use tracing::{debug, info, warn};

const MAX_CONNECTIONS: u32 = 8;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

const CREATE_GAUGE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS gauge (id TEXT PRIMARY KEY, value DOUBLE PRECISION NOT NULL)";
const CREATE_COUNTER_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS counter (id TEXT PRIMARY KEY, \
     value BIGINT NOT NULL CHECK (typeof(value) = 'integer'))";

const UPSERT_GAUGE: &str = "INSERT INTO gauge (id, value) VALUES (?1, ?2) \
     ON CONFLICT (id) DO UPDATE SET value = excluded.value RETURNING value";
// SQLite turns an overflowing integer sum into a REAL; such an update is
// skipped and returns no row.
const UPSERT_COUNTER: &str = "INSERT INTO counter (id, value) VALUES (?1, ?2) \
     ON CONFLICT (id) DO UPDATE SET value = counter.value + excluded.value \
     WHERE typeof(counter.value + excluded.value) = 'integer' RETURNING value";

const SELECT_GAUGE: &str = "SELECT value FROM gauge WHERE id = ?1";
const SELECT_COUNTER: &str = "SELECT value FROM counter WHERE id = ?1";
const LIST_GAUGES: &str = "SELECT id, value FROM gauge";
const LIST_COUNTERS: &str = "SELECT id, value FROM counter";

pub struct SqlStore {
    pool: SqlitePool,
    backoff: BackoffPolicy,
}

fn is_retryable(err: &sqlx::Error) -> bool {
    !matches!(
        err,
        sqlx::Error::PoolClosed | sqlx::Error::Configuration(_)
    )
}

async fn upsert(conn: &mut SqliteConnection, metric: Metric) -> Result<Metric, StorageError> {
    match metric.kind {
        MetricKind::Counter => {
            let value: Option<i64> = sqlx::query_scalar(UPSERT_COUNTER)
                .bind(&metric.id)
                .bind(metric.delta)
                .fetch_optional(&mut *conn)
                .await?;
            match value {
                Some(value) => Ok(Metric::counter(metric.id, value)),
                None => Err(MetricError::Overflow(metric.id).into()),
            }
        }
        MetricKind::Gauge => {
            let value: f64 = sqlx::query_scalar(UPSERT_GAUGE)
                .bind(&metric.id)
                .bind(metric.value)
                .fetch_one(&mut *conn)
                .await?;
            Ok(Metric::gauge(metric.id, value))
        }
    }
}

impl SqlStore {
    /// Opens a pool for `dsn` (e.g. `sqlite://metrics.db`) and makes sure the
    /// schema exists. The database file is created when missing.
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(dsn)?.create_if_missing(true);
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT);
        if dsn.contains(":memory:") {
            // each connection would otherwise see its own empty database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        let store = SqlStore {
            pool,
            backoff: BackoffPolicy::default(),
        };
        store.ensure_schema().await?;
        info!("Connected to database");
        Ok(store)
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.acquire().await?;
        sqlx::query(CREATE_GAUGE_TABLE).execute(&mut *conn).await?;
        sqlx::query(CREATE_COUNTER_TABLE).execute(&mut *conn).await?;
        Ok(())
    }

    /// A pooled connection that answered a ping, retried with backoff.
    async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StorageError> {
        self.backoff
            .retry(
                || async {
                    let mut conn = self.pool.acquire().await?;
                    conn.ping().await?;
                    Ok::<_, sqlx::Error>(conn)
                },
                is_retryable,
            )
            .await
            .map_err(|e| {
                warn!("Unable to get a database connection: {e}");
                StorageError::ConnectionUnavailable
            })
    }
}

#[async_trait]
impl Storage for SqlStore {
    async fn put(&self, metric: Metric) -> Result<Metric, StorageError> {
        metric.validate()?;
        let mut conn = self.acquire().await?;
        upsert(&mut conn, metric).await
    }

    async fn get(&self, query: &Metric) -> Result<Metric, StorageError> {
        let mut conn = self.acquire().await?;
        let found = match query.kind {
            MetricKind::Counter => sqlx::query_scalar::<_, i64>(SELECT_COUNTER)
                .bind(&query.id)
                .fetch_optional(&mut *conn)
                .await?
                .map(|v| Metric::counter(query.id.clone(), v)),
            MetricKind::Gauge => sqlx::query_scalar::<_, f64>(SELECT_GAUGE)
                .bind(&query.id)
                .fetch_optional(&mut *conn)
                .await?
                .map(|v| Metric::gauge(query.id.clone(), v)),
        };
        found.ok_or_else(|| StorageError::NotFound {
            id: query.id.clone(),
            kind: query.kind,
        })
    }

    async fn list(&self) -> Result<Vec<Metric>, StorageError> {
        let mut conn = self.acquire().await?;
        let gauges: Vec<(String, f64)> = sqlx::query_as(LIST_GAUGES)
            .fetch_all(&mut *conn)
            .await?;
        let counters: Vec<(String, i64)> = sqlx::query_as(LIST_COUNTERS)
            .fetch_all(&mut *conn)
            .await?;

        let mut metrics = Vec::with_capacity(gauges.len() + counters.len());
        metrics.extend(gauges.into_iter().map(|(id, v)| Metric::gauge(id, v)));
        metrics.extend(counters.into_iter().map(|(id, d)| Metric::counter(id, d)));
        Ok(metrics)
    }

    async fn put_batch(&self, metrics: Vec<Metric>) -> Result<(), StorageError> {
        for metric in &metrics {
            metric.validate()?;
        }
        let n_metrics = metrics.len();
        let mut conn = self.acquire().await?;
        let mut tx = conn.begin().await?;
        for metric in metrics {
            // dropping the transaction on error rolls it back
            upsert(&mut tx, metric).await?;
        }
        tx.commit().await?;
        debug!("Stored batch of {n_metrics} metrics");
        Ok(())
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Database connection closed");
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.acquire().await.map(|_| ())
    }
}
