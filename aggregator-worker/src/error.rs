use thiserror::Error;

use aggregator_core::store::StoreError;
use aggregator_core::transport::TransportError;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to serve metrics: {0}")]
    Serve(#[from] std::io::Error),
}
