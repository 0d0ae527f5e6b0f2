use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use aggregator_core::Service;

use crate::handlers;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub batch_size_limit: usize,
}

/// Build the HTTP router. `metrics` gates whether `/metrics` is mounted, so tests can
/// build a router without installing a global Prometheus recorder.
pub fn router(service: Service, batch_size_limit: usize, metrics: bool) -> Router {
    let state = AppState {
        service: Arc::new(service),
        batch_size_limit,
    };

    let router = Router::new()
        .route("/", get(handlers::index))
        .route("/publish", post(handlers::publish))
        .route("/events", get(handlers::list_events))
        .route("/stats", get(handlers::stats))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(metrics_util::track_metrics))
        .with_state(state);

    if metrics {
        router.merge(metrics_util::setup_metrics_router())
    } else {
        router
    }
}
