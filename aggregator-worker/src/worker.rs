//! The worker pool: each worker holds its own subscription (Redis fans out pub/sub
//! independently per connection) and admits whatever it receives until told to stop.

use std::sync::Arc;
use std::time::Duration;

use health::HealthRegistry;
use tokio::sync::watch;

use aggregator_core::coordinator::Coordinator;
use aggregator_core::store::Store;
use aggregator_core::transport::Transport;

/// How long a worker may go without reporting healthy before it is considered stalled.
const LIVENESS_DEADLINE: time::Duration = time::Duration::seconds(60);

/// How long a single `recv_timeout` call blocks waiting for a message before looping
/// back around to check the shutdown signal. Mirrors the consumer's polling interval.
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// A pool of identical workers, each subscribed independently to the transport's channel.
pub struct WorkerPool {
    store: Store,
    transport: Arc<dyn Transport>,
    worker_count: usize,
    liveness: HealthRegistry,
}

impl WorkerPool {
    pub fn new(
        store: Store,
        transport: Arc<dyn Transport>,
        worker_count: usize,
        liveness: HealthRegistry,
    ) -> Self {
        Self {
            store,
            transport,
            worker_count,
            liveness,
        }
    }

    /// Run all workers until `shutdown` is signalled, then wait for each to drain its
    /// current iteration and return.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(self.worker_count);

        for index in 0..self.worker_count {
            let worker_id = format!("worker-{index}");
            let coordinator = Coordinator::new(self.store.clone(), self.transport.clone());
            let transport = self.transport.clone();
            let liveness = self
                .liveness
                .register(worker_id.clone(), LIVENESS_DEADLINE)
                .await;
            let mut shutdown = shutdown.clone();

            handles.push(tokio::spawn(async move {
                run_one(worker_id, coordinator, transport, liveness, &mut shutdown).await;
            }));
        }

        let _ = shutdown.changed().await;

        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn run_one(
    worker_id: String,
    coordinator: Coordinator,
    transport: Arc<dyn Transport>,
    liveness: health::HealthHandle,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut subscription = match transport.subscribe().await {
        Ok(subscription) => subscription,
        Err(error) => {
            tracing::error!(%worker_id, %error, "failed to subscribe, worker exiting");
            return;
        }
    };

    loop {
        if *shutdown.borrow() {
            break;
        }

        liveness.report_healthy().await;

        match subscription.recv_timeout(RECV_TIMEOUT).await {
            Ok(Some(event)) => match coordinator.ingest_one(&event, &worker_id).await {
                Ok(result) => {
                    tracing::debug!(
                        %worker_id,
                        topic = %event.topic,
                        event_id = %event.event_id,
                        was_new = result.was_new,
                        "admitted event"
                    );
                }
                Err(error) => {
                    tracing::warn!(%worker_id, %error, "failed to admit event, continuing");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%worker_id, %error, "transport error, continuing");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    tracing::info!(%worker_id, "worker stopped");
}
