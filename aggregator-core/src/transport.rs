//! The transport adapter: Redis pub/sub fan-out to worker subscribers.
//!
//! Publish/subscribe are exposed behind a trait so callers don't care whether they're
//! talking to Redis or a test double, but the delivery semantics (best-effort fan-out to
//! however many subscribers are listening, no persistence, no acks) come from the Redis
//! `PUBLISH`/`SUBSCRIBE` pair the system was built on.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use thiserror::Error;

use crate::config::TransportConfig;
use crate::event::Event;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishes events onto a channel and hands out subscriptions to receive them.
///
/// Delivery is at-least-once *per active subscriber*: a subscriber that is not connected
/// when an event is published never sees it. Idempotent admission at the store is what
/// makes re-publishing (and therefore re-delivery) safe.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, event: &Event) -> Result<(), TransportError>;
    async fn publish_batch(&self, events: &[Event]) -> Result<(), TransportError>;
    async fn subscribe(&self) -> Result<Subscription, TransportError>;

    /// Trivial connectivity probe used by the health endpoint.
    async fn health(&self) -> bool;
}

/// A live subscription to the configured channel. Carries raw payload bytes rather than
/// `redis::Msg` so non-Redis implementations (see `InMemoryTransport`) can produce one too.
pub struct Subscription {
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = Vec<u8>> + Send>>,
}

impl Subscription {
    /// Wait up to `timeout` for the next message, returning `None` on a timeout or a
    /// message that failed to decode as an `Event` (logged and skipped by the caller).
    ///
    /// Mirrors the consumer loop's `asyncio.wait_for(pubsub.get_message(...), timeout=2.0)`:
    /// a timeout is routine, not an error, and lets the caller check its shutdown signal.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Event>, TransportError> {
        match tokio::time::timeout(timeout, self.stream.next()).await {
            Ok(Some(payload)) => match Event::parse(&payload) {
                Ok(event) => Ok(Some(event)),
                Err(error) => {
                    tracing::warn!(%error, "dropping unparseable message from subscription");
                    Ok(None)
                }
            },
            Ok(None) => Ok(None),
            Err(_elapsed) => Ok(None),
        }
    }
}

/// A Redis-backed `Transport`.
pub struct RedisTransport {
    client: redis::Client,
    channel: String,
}

impl RedisTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            channel: config.channel.clone(),
        })
    }

    async fn publish_one(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        event: &Event,
    ) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(event)?;
        let _: () = conn.publish(&self.channel, payload).await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, event: &Event) -> Result<(), TransportError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.publish_one(&mut conn, event).await
    }

    async fn publish_batch(&self, events: &[Event]) -> Result<(), TransportError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        for event in events {
            let payload = serde_json::to_vec(event)?;
            pipe.publish(&self.channel, payload).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, TransportError> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        pubsub.subscribe(&self.channel).await?;
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move { msg.get_payload::<Vec<u8>>().ok() });
        Ok(Subscription {
            stream: Box::pin(stream),
        })
    }

    async fn health(&self) -> bool {
        let Ok(mut conn) = self.client.get_multiplexed_async_connection().await else {
            return false;
        };
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

/// A `Transport` that accepts and discards publishes, for exercising the synchronous
/// ingest path in tests without a running Redis instance.
#[cfg(any(test, feature = "test-util"))]
pub struct NoopTransport;

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Transport for NoopTransport {
    async fn publish(&self, _event: &Event) -> Result<(), TransportError> {
        Ok(())
    }

    async fn publish_batch(&self, _events: &[Event]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, TransportError> {
        unimplemented!("NoopTransport has no channel to subscribe to")
    }

    async fn health(&self) -> bool {
        true
    }
}

/// An in-process `Transport` backed by a broadcast channel, standing in for Redis pub/sub
/// in worker pool tests: every subscriber sees every message published after it subscribed,
/// matching Redis's per-connection fan-out.
#[cfg(any(test, feature = "test-util"))]
pub struct InMemoryTransport {
    sender: tokio::sync::broadcast::Sender<Vec<u8>>,
}

#[cfg(any(test, feature = "test-util"))]
impl InMemoryTransport {
    pub fn new() -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(1024);
        Self { sender }
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, event: &Event) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(event)?;
        let _ = self.sender.send(payload);
        Ok(())
    }

    async fn publish_batch(&self, events: &[Event]) -> Result<(), TransportError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, TransportError> {
        let receiver = self.sender.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(receiver)
            .filter_map(|item| async move { item.ok() });
        Ok(Subscription {
            stream: Box::pin(stream),
        })
    }

    async fn health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_transport_rejects_an_unparseable_url() {
        let config = TransportConfig {
            redis_url: "not-a-url".to_owned(),
            channel: "events".to_owned(),
            flush_interval_ms: 1000,
        };
        assert!(RedisTransport::new(&config).is_err());
    }
}
