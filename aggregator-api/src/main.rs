//! HTTP facade over the ingestion pipeline: accepts submissions, serves queries, and
//! reports health.
use envconfig::Envconfig;
use tokio::signal::unix::{signal, SignalKind};

use aggregator_core::Service;
use aggregator_api::config::Config;
use aggregator_api::router::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("invalid configuration");

    let service = Service::from_config(&config.store, &config.transport).await?;
    service.store.migrate().await?;

    let app = router(service, config.batch_size_limit, true);

    let bind = config.bind();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    Ok(())
}

async fn shutdown() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
    tracing::info!("shutdown signal received");
}
