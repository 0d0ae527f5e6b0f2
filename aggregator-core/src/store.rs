//! The store adapter: idempotent insert, atomic counter update, audit append, and queries.
//!
//! Backed by a `sqlx::PgPool`. The `(topic, event_id)` uniqueness constraint is the only
//! source of mutual exclusion between concurrent admitters; no application-level lock is
//! used. See `migrations/0001_init.sql` for the schema.

use std::collections::HashMap;
use std::time::Duration;

use std::str::FromStr;

use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::StoreConfig;
use crate::event::Event;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to connect to the store: {0}")]
    Connection(sqlx::Error),
    #[error("{command} query failed: {error}")]
    Query { command: String, error: sqlx::Error },
}

/// Result of admitting a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmitResult {
    pub was_new: bool,
}

/// Result of admitting a batch of events in one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchAdmitResult {
    pub processed: i64,
    pub duplicates: i64,
}

/// An event as persisted, superset of `Event` plus store-assigned metadata.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredEvent {
    pub topic: String,
    pub event_id: String,
    pub timestamp: OffsetDateTime,
    pub source: String,
    #[sqlx(json)]
    pub payload: Value,
    pub worker_id: String,
    pub processed_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct TopicCount {
    pub topic: String,
    pub event_count: i64,
}

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub received: i64,
    pub unique_processed: i64,
    pub duplicate_dropped: i64,
    pub topics: Vec<TopicCount>,
    pub started_at: OffsetDateTime,
    pub last_updated_at: OffsetDateTime,
}

impl StatsSnapshot {
    /// Percentage of received events that were duplicates, rounded to 2 decimal places.
    pub fn duplicate_rate(&self) -> f64 {
        if self.received > 0 {
            let rate = self.duplicate_dropped as f64 / self.received as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        }
    }
}

/// A connection pool backed store adapter.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to Postgres and build a pool sized per `config`.
    ///
    /// `statement_timeout_ms` is applied as a session-level `statement_timeout` on every
    /// connection in the pool, bounding how long any one query may run (a query stuck on a
    /// lock is killed rather than left to block a worker or request indefinitely). This is
    /// distinct from `acquire_timeout`, which only bounds how long a caller waits for a
    /// pooled connection to become available.
    pub async fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let connect_options =
            PgConnectOptions::from_str(&config.database_url).map_err(StoreError::Connection)?;
        let statement_timeout_ms = config.statement_timeout_ms;

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query(&format!("SET statement_timeout = {statement_timeout_ms}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .map_err(StoreError::Connection)?;

        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool, e.g. one provided by `sqlx::test` in integration tests.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations against the store. Intended for use at service startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "MIGRATE".to_owned(),
                error: sqlx::Error::Migrate(Box::new(error)),
            })
    }

    /// Admit a single event: insert-or-ignore, update the Stats singleton, append an audit row.
    pub async fn admit(&self, event: &Event, worker_id: &str) -> Result<AdmitResult, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Connection)?;

        let was_new = insert_event(&mut tx, event, worker_id).await?;
        append_audit(&mut tx, event, worker_id, !was_new).await?;

        sqlx::query(
            r#"
            UPDATE stats
            SET received = received + 1,
                unique_processed = unique_processed + $1,
                duplicate_dropped = duplicate_dropped + $2,
                last_updated_at = NOW()
            WHERE id = 1
            "#,
        )
        .bind(i64::from(was_new))
        .bind(i64::from(!was_new))
        .execute(&mut *tx)
        .await
        .map_err(|error| StoreError::Query {
            command: "UPDATE stats".to_owned(),
            error,
        })?;

        tx.commit().await.map_err(StoreError::Connection)?;

        Ok(AdmitResult { was_new })
    }

    /// Admit a batch of events inside a single transaction, with one trailing Stats update.
    pub async fn admit_batch(
        &self,
        events: &[Event],
        worker_id: &str,
    ) -> Result<BatchAdmitResult, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Connection)?;

        let mut processed: i64 = 0;
        let mut duplicates: i64 = 0;

        for event in events {
            let was_new = insert_event(&mut tx, event, worker_id).await?;
            append_audit(&mut tx, event, worker_id, !was_new).await?;
            if was_new {
                processed += 1;
            } else {
                duplicates += 1;
            }
        }

        sqlx::query(
            r#"
            UPDATE stats
            SET received = received + $1,
                unique_processed = unique_processed + $2,
                duplicate_dropped = duplicate_dropped + $3,
                last_updated_at = NOW()
            WHERE id = 1
            "#,
        )
        .bind(events.len() as i64)
        .bind(processed)
        .bind(duplicates)
        .execute(&mut *tx)
        .await
        .map_err(|error| StoreError::Query {
            command: "UPDATE stats".to_owned(),
            error,
        })?;

        tx.commit().await.map_err(StoreError::Connection)?;

        Ok(BatchAdmitResult {
            processed,
            duplicates,
        })
    }

    /// List events newest-first, optionally filtered by topic, paginated.
    pub async fn list_events(
        &self,
        topic: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = match topic {
            Some(topic) => sqlx::query_as::<_, StoredEvent>(
                r#"
                SELECT topic, event_id, timestamp, source, payload, worker_id, processed_at
                FROM events
                WHERE topic = $1
                ORDER BY timestamp DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(topic)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query_as::<_, StoredEvent>(
                r#"
                SELECT topic, event_id, timestamp, source, payload, worker_id, processed_at
                FROM events
                ORDER BY timestamp DESC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await,
        };

        rows.map_err(|error| StoreError::Query {
            command: "SELECT events".to_owned(),
            error,
        })
    }

    /// Count events, optionally filtered by topic.
    pub async fn count_events(&self, topic: Option<&str>) -> Result<i64, StoreError> {
        let count = match topic {
            Some(topic) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE topic = $1")
                    .bind(topic)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events")
                    .fetch_one(&self.pool)
                    .await
            }
        };

        count.map_err(|error| StoreError::Query {
            command: "SELECT COUNT".to_owned(),
            error,
        })
    }

    /// A full aggregate stats snapshot, including a per-topic breakdown.
    pub async fn stats_snapshot(&self) -> Result<StatsSnapshot, StoreError> {
        let (received, unique_processed, duplicate_dropped, started_at, last_updated_at): (
            i64,
            i64,
            i64,
            OffsetDateTime,
            OffsetDateTime,
        ) = sqlx::query_as(
            r#"
            SELECT received, unique_processed, duplicate_dropped, started_at, last_updated_at
            FROM stats WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            command: "SELECT stats".to_owned(),
            error,
        })?;

        let topic_rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT topic, COUNT(*) as event_count
            FROM events
            GROUP BY topic
            ORDER BY event_count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            command: "SELECT topic counts".to_owned(),
            error,
        })?;

        let topics = topic_rows
            .into_iter()
            .map(|(topic, event_count)| TopicCount { topic, event_count })
            .collect();

        Ok(StatsSnapshot {
            received,
            unique_processed,
            duplicate_dropped,
            topics,
            started_at,
            last_updated_at,
        })
    }

    /// Trivial connectivity probe used by the health endpoint.
    pub async fn health(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &Event,
    worker_id: &str,
) -> Result<bool, StoreError> {
    let payload = payload_as_json(&event.payload);

    let inserted: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO events (topic, event_id, timestamp, source, payload, worker_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (topic, event_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&event.topic)
    .bind(&event.event_id)
    .bind(event.timestamp)
    .bind(&event.source)
    .bind(sqlx::types::Json(payload))
    .bind(worker_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|error| StoreError::Query {
        command: "INSERT events".to_owned(),
        error,
    })?;

    Ok(inserted.is_some())
}

async fn append_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    event: &Event,
    worker_id: &str,
    is_duplicate: bool,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (topic, event_id, is_duplicate, worker_id)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&event.topic)
    .bind(&event.event_id)
    .bind(is_duplicate)
    .bind(worker_id)
    .execute(&mut **tx)
    .await
    .map_err(|error| StoreError::Query {
        command: "INSERT audit_log".to_owned(),
        error,
    })?;

    Ok(())
}

fn payload_as_json(payload: &HashMap<String, Value>) -> Value {
    Value::Object(payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}
