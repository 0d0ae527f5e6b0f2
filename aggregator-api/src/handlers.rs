use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;

use aggregator_core::event::Event;

use crate::api::{
    ApiError, EventListResponse, EventResponse, EventsQuery, HealthResponse, PublishQuery,
    PublishResponse, StatsResponse,
};
use crate::config::MAX_BATCH_SIZE;
use crate::router::AppState;

pub async fn index() -> &'static str {
    "event aggregator"
}

pub async fn publish(
    State(state): State<AppState>,
    Query(query): Query<PublishQuery>,
    body: Bytes,
) -> Result<Json<PublishResponse>, ApiError> {
    let events = Event::parse_request(&body)?;

    if events.is_empty() {
        return Err(ApiError::EmptyBatch);
    }
    if events.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BatchTooLarge(events.len(), MAX_BATCH_SIZE));
    }

    let received = events.len();
    let event_ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();

    if query.sync {
        let result = state
            .service
            .coordinator
            .ingest_sync(&events, "api", state.batch_size_limit)
            .await?;

        Ok(Json(PublishResponse {
            success: true,
            message: "events processed".to_owned(),
            received,
            duplicates: result.duplicates as usize,
            processed: result.processed as usize,
            event_ids,
        }))
    } else {
        state.service.coordinator.ingest_async(&events).await?;

        Ok(Json(PublishResponse {
            success: true,
            message: "events published for async processing".to_owned(),
            received,
            duplicates: 0,
            processed: 0,
            event_ids,
        }))
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventListResponse>, ApiError> {
    let limit = query.limit.clamp(1, MAX_BATCH_SIZE as i64);
    let offset = query.offset.max(0);

    let events = state
        .service
        .store
        .list_events(query.topic.as_deref(), limit, offset)
        .await?;
    let total = state.service.store.count_events(query.topic.as_deref()).await?;

    let events: Vec<EventResponse> = events.into_iter().map(EventResponse::from).collect();
    let count = events.len();

    Ok(Json(EventListResponse {
        events,
        count,
        total,
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let snapshot = state.service.store.stats_snapshot().await?;
    Ok(Json(StatsResponse::from(snapshot)))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.service.store.health().await;
    let transport = state.service.transport.health().await;
    let healthy = database && transport;

    let status = if healthy { "healthy" } else { "unhealthy" };
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status,
        database,
        transport,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.service.uptime_seconds(),
    };

    (status_code, Json(body))
}
