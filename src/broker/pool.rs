//! Producer connection pool
//!
//! One producer per logical client id, created on first use and shared by
//! every stage that publishes under that id. The pool is owned by the
//! composition root and handed to stages through `PooledPublisher`.

use crate::runtime::{PublishError, Publisher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::task::TaskTracker;

type Connector<P> = Box<dyn Fn(&str) -> Result<P, PublishError> + Send + Sync>;

pub struct ProducerPool<P> {
    connect: Connector<P>,
    producers: Mutex<HashMap<String, Arc<P>>>,
    /// Tracks every publish in progress so shutdown can drain them
    in_flight: TaskTracker,
}

impl<P: Publisher> ProducerPool<P> {
    pub fn new(connect: impl Fn(&str) -> Result<P, PublishError> + Send + Sync + 'static) -> Self {
        Self {
            connect: Box::new(connect),
            producers: Mutex::new(HashMap::new()),
            in_flight: TaskTracker::new(),
        }
    }

    /// Producer for `client_id`, created if this is the first request for it
    pub fn producer(&self, client_id: &str) -> Result<Arc<P>, PublishError> {
        if self.is_shut_down() {
            return Err(PublishError::ShutDown);
        }
        let mut producers = self
            .producers
            .lock()
            .map_err(|_| PublishError::Transport("producer pool lock poisoned".to_string()))?;
        if let Some(producer) = producers.get(client_id) {
            return Ok(Arc::clone(producer));
        }
        let producer = Arc::new((self.connect)(client_id)?);
        producers.insert(client_id.to_string(), Arc::clone(&producer));
        tracing::info!(client_id, "Created broker producer");
        Ok(producer)
    }

    pub async fn publish(
        &self,
        client_id: &str,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        let producer = self.producer(client_id)?;
        let publish = self
            .in_flight
            .track_future(async move { producer.publish(topic, partition_key, payload).await });
        // Checked after tracking: either shutdown has not started and will
        // wait for this publish, or it has and the publish is refused.
        if self.is_shut_down() {
            return Err(PublishError::ShutDown);
        }
        publish.await
    }

    /// Refuse new publishes, wait for in-flight ones, then drop every producer
    pub async fn shutdown(&self) {
        self.in_flight.close();
        let pending = self.in_flight.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight publishes");
        }
        self.in_flight.wait().await;

        let released = match self.producers.lock() {
            Ok(mut producers) => producers.drain().count(),
            Err(poisoned) => poisoned.into_inner().drain().count(),
        };
        tracing::info!(producers = released, "Producer pool shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.in_flight.is_closed()
    }

    /// Number of live producers
    pub fn producer_count(&self) -> usize {
        self.producers.lock().map_or(0, |p| p.len())
    }
}

/// `Publisher` view of a pool, bound to one client id
pub struct PooledPublisher<P> {
    pool: Arc<ProducerPool<P>>,
    client_id: String,
}

impl<P> PooledPublisher<P> {
    pub fn new(pool: Arc<ProducerPool<P>>, client_id: impl Into<String>) -> Self {
        Self {
            pool,
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl<P: Publisher> Publisher for PooledPublisher<P> {
    async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        payload: &[u8],
    ) -> Result<(), PublishError> {
        self.pool
            .publish(&self.client_id, topic, partition_key, payload)
            .await
    }
}
