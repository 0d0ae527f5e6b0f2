//! Consume published events from the transport and admit them into the store.
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use std::future::ready;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use aggregator_core::store::Store;
use aggregator_core::transport::RedisTransport;
use aggregator_worker::config::Config;
use aggregator_worker::error::WorkerError;
use aggregator_worker::worker::WorkerPool;
use health::HealthRegistry;

#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(WorkerError::Config(error.to_string()));
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().map_err(|error| WorkerError::Config(error.to_string()))?;

    let liveness = HealthRegistry::new("liveness");

    let store = Store::new(&config.store).await?;
    store.migrate().await?;

    let transport: Arc<dyn aggregator_core::transport::Transport> =
        Arc::new(RedisTransport::new(&config.transport)?);

    let pool = WorkerPool::new(store, transport, config.worker_count, liveness.clone());

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())));
    let router = router.merge(metrics_util::setup_metrics_router());
    let bind = config.bind();

    tokio::task::spawn(async move {
        metrics_util::serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    pool.run(shutdown_rx).await;

    Ok(())
}

pub async fn index() -> &'static str {
    "event aggregator worker"
}
