use envconfig::Envconfig;

use aggregator_core::config::{StoreConfig, TransportConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3300")]
    pub port: u16,

    #[envconfig(from = "BATCH_SIZE_LIMIT", default = "100")]
    pub batch_size_limit: usize,

    #[envconfig(nested = true)]
    pub store: StoreConfig,

    #[envconfig(nested = true)]
    pub transport: TransportConfig,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Hard ceiling on a single submission's event count, independent of `batch_size_limit`.
pub const MAX_BATCH_SIZE: usize = 1000;
