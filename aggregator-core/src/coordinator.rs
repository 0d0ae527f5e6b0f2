//! The ingest coordinator: routes admitted submissions to either the store directly
//! (synchronous path) or the transport for a worker to pick up later (asynchronous path).
//!
//! All de-duplication logic lives in the store's `(topic, event_id)` uniqueness constraint;
//! the coordinator never inspects or caches identity itself, it only routes.

use std::sync::Arc;

use thiserror::Error;

use crate::event::Event;
use crate::store::{AdmitResult, BatchAdmitResult, Store, StoreError};
use crate::transport::{Transport, TransportError};

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The entry point submissions (HTTP or otherwise) call into.
#[derive(Clone)]
pub struct Coordinator {
    store: Store,
    transport: Arc<dyn Transport>,
}

impl Coordinator {
    pub fn new(store: Store, transport: Arc<dyn Transport>) -> Self {
        Self { store, transport }
    }

    /// Admit a single already-decoded event, on the caller's own task.
    ///
    /// The entry point workers call after decoding a message off the transport: C4 never
    /// talks to C2 directly, it always hands the event to the coordinator first.
    pub async fn ingest_one(
        &self,
        event: &Event,
        worker_id: &str,
    ) -> Result<AdmitResult, CoordinatorError> {
        self.store.admit(event, worker_id).await.map_err(Into::into)
    }

    /// Admit events immediately against the store, on the caller's own task.
    ///
    /// `worker_id` identifies the admitting process in the audit log; callers on the
    /// synchronous path use a fixed identifier such as `"api"` since there is no worker pool
    /// involved. `chunk_size` bounds how many events share one transaction, so a single large
    /// submission cannot hold a connection for the whole request.
    pub async fn ingest_sync(
        &self,
        events: &[Event],
        worker_id: &str,
        chunk_size: usize,
    ) -> Result<BatchAdmitResult, CoordinatorError> {
        let chunk_size = chunk_size.max(1);
        let mut processed = 0;
        let mut duplicates = 0;

        for chunk in events.chunks(chunk_size) {
            let result = self.store.admit_batch(chunk, worker_id).await?;
            processed += result.processed;
            duplicates += result.duplicates;
        }

        Ok(BatchAdmitResult {
            processed,
            duplicates,
        })
    }

    /// Hand events to the transport for asynchronous admission by the worker pool.
    ///
    /// Returns as soon as the events are published; it makes no claim about whether they
    /// have been admitted yet, only that they have been handed off. The caller reports
    /// `processed: 0, duplicates: 0` for this path — real counts only become visible
    /// later, through a stats snapshot, once a worker actually admits each event.
    pub async fn ingest_async(&self, events: &[Event]) -> Result<(), CoordinatorError> {
        self.transport.publish_batch(events).await?;
        Ok(())
    }
}
