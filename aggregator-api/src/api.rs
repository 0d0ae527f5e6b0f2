use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use aggregator_core::coordinator::CoordinatorError;
use aggregator_core::event::ValidationError;
use aggregator_core::store::{StatsSnapshot, StoreError, StoredEvent};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to decode request body: {0}")]
    Malformed(#[from] ValidationError),
    #[error("batch holds no events")]
    EmptyBatch,
    #[error("batch of {0} events exceeds the maximum of {1}")]
    BatchTooLarge(usize, usize),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Malformed(_) | ApiError::EmptyBatch | ApiError::BatchTooLarge(_, _) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(_) | ApiError::Coordinator(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishQuery {
    #[serde(default)]
    pub sync: bool,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub message: String,
    pub received: usize,
    pub duplicates: usize,
    pub processed: usize,
    pub event_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub topic: String,
    pub event_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: String,
    pub payload: serde_json::Value,
    pub worker_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
}

impl From<StoredEvent> for EventResponse {
    fn from(event: StoredEvent) -> Self {
        Self {
            topic: event.topic,
            event_id: event.event_id,
            timestamp: event.timestamp,
            source: event.source,
            payload: event.payload,
            worker_id: event.worker_id,
            processed_at: event.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventResponse>,
    pub count: usize,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct TopicStatsResponse {
    pub topic: String,
    pub event_count: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub received: i64,
    pub unique_processed: i64,
    pub duplicate_dropped: i64,
    pub duplicate_rate: f64,
    pub topics: Vec<TopicStatsResponse>,
    pub topic_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated_at: OffsetDateTime,
}

impl From<StatsSnapshot> for StatsResponse {
    fn from(snapshot: StatsSnapshot) -> Self {
        let duplicate_rate = snapshot.duplicate_rate();
        let topic_count = snapshot.topics.len();
        Self {
            received: snapshot.received,
            unique_processed: snapshot.unique_processed,
            duplicate_dropped: snapshot.duplicate_dropped,
            duplicate_rate,
            topics: snapshot
                .topics
                .into_iter()
                .map(|t| TopicStatsResponse {
                    topic: t.topic,
                    event_count: t.event_count,
                })
                .collect(),
            topic_count,
            started_at: snapshot.started_at,
            last_updated_at: snapshot.last_updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
    pub transport: bool,
    pub version: &'static str,
    pub uptime_seconds: i64,
}
