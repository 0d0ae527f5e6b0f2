//! Shared, nestable configuration fragments for the store and transport adapters.
//!
//! Each binary (`aggregator-api`, `aggregator-worker`) owns its own top-level `Config`
//! and nests these via `#[envconfig(nested = true)]`.

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct StoreConfig {
    #[envconfig(from = "DATABASE_URL")]
    pub database_url: String,

    #[envconfig(from = "DATABASE_MIN_CONNECTIONS", default = "5")]
    pub min_connections: u32,

    #[envconfig(from = "DATABASE_MAX_CONNECTIONS", default = "20")]
    pub max_connections: u32,

    #[envconfig(from = "DATABASE_STATEMENT_TIMEOUT_MS", default = "60000")]
    pub statement_timeout_ms: u64,
}

#[derive(Envconfig, Clone)]
pub struct TransportConfig {
    #[envconfig(from = "REDIS_URL")]
    pub redis_url: String,

    #[envconfig(from = "REDIS_CHANNEL", default = "events")]
    pub channel: String,

    /// Hint for how often a buffering publisher should flush. Unused by `RedisTransport`,
    /// which publishes synchronously on every call; carried for parity with deployments
    /// that front it with a batching producer.
    #[envconfig(from = "FLUSH_INTERVAL_MS", default = "1000")]
    pub flush_interval_ms: u64,
}
