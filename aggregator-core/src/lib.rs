//! Shared domain logic for the ingestion pipeline: event validation, the store adapter,
//! the transport adapter, and the coordinator that routes between them.
//!
//! Both `aggregator-api` and `aggregator-worker` depend on this crate rather than on each
//! other; it is the only place store/transport wiring and event semantics are defined.

pub mod config;
pub mod coordinator;
pub mod event;
pub mod store;
pub mod transport;

use std::sync::Arc;

use time::OffsetDateTime;

use coordinator::Coordinator;
use store::Store;
use transport::{RedisTransport, Transport};

/// The explicit, injectable handle to everything a binary needs to run: no process-wide
/// singletons, state threaded through `axum::State` or passed to the worker pool directly.
#[derive(Clone)]
pub struct Service {
    pub store: Store,
    pub transport: Arc<dyn Transport>,
    pub coordinator: Coordinator,
    pub started_at: OffsetDateTime,
}

impl Service {
    pub fn new(store: Store, transport: Arc<dyn Transport>) -> Self {
        let coordinator = Coordinator::new(store.clone(), transport.clone());
        Self {
            store,
            transport,
            coordinator,
            started_at: OffsetDateTime::now_utc(),
        }
    }

    /// Build a `Service` from env-derived config, using the Redis-backed transport.
    pub async fn from_config(
        store_config: &config::StoreConfig,
        transport_config: &config::TransportConfig,
    ) -> anyhow::Result<Self> {
        let store = Store::new(store_config).await?;
        let transport = Arc::new(RedisTransport::new(transport_config)?);
        Ok(Self::new(store, transport))
    }

    pub fn uptime_seconds(&self) -> i64 {
        (OffsetDateTime::now_utc() - self.started_at).whole_seconds()
    }
}
