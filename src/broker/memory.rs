//! In-process broker.
//!
//! Queues are unbounded channels created on first use. A queue accepts a
//! single consumer; messages published before it attaches are buffered.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::broker::{Broker, BrokerError, Channel, Deliveries, Delivery};

#[derive(Debug)]
struct Queue {
    tx: mpsc::UnboundedSender<Delivery>,
    rx: Option<mpsc::UnboundedReceiver<Delivery>>,
    published: u64,
    unacked: HashSet<u64>,
    acked: u64,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            published: 0,
            unacked: HashSet::new(),
            acked: 0,
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: DashMap<String, Queue>,
    next_tag: AtomicU64,
    channels: AtomicUsize,
}

/// Broker living inside the process. Cloning shares the same queues.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish directly, bypassing a channel.
    pub fn publish(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError> {
        let tag = self.state.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entry = self
            .state
            .queues
            .entry(queue.to_string())
            .or_insert_with(Queue::new);
        entry
            .tx
            .send(Delivery {
                queue: queue.to_string(),
                tag,
                content: payload,
            })
            .map_err(|_| BrokerError::Closed)?;
        entry.published += 1;
        entry.unacked.insert(tag);
        Ok(())
    }

    pub fn published_count(&self, queue: &str) -> u64 {
        self.state.queues.get(queue).map_or(0, |q| q.published)
    }

    pub fn acked_count(&self, queue: &str) -> u64 {
        self.state.queues.get(queue).map_or(0, |q| q.acked)
    }

    pub fn has_consumer(&self, queue: &str) -> bool {
        self.state.queues.get(queue).is_some_and(|q| q.rx.is_none())
    }

    pub fn channels_created(&self) -> usize {
        self.state.channels.load(Ordering::Relaxed)
    }

    fn consume(&self, queue: &str) -> Result<Deliveries, BrokerError> {
        let mut entry = self
            .state
            .queues
            .entry(queue.to_string())
            .or_insert_with(Queue::new);
        let rx = entry
            .rx
            .take()
            .ok_or_else(|| BrokerError::AlreadyConsumed(queue.to_string()))?;
        tracing::debug!(queue = %queue, "Consumer attached");
        Ok(Deliveries::new(rx))
    }

    fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let unknown = || BrokerError::UnknownDelivery {
            queue: delivery.queue.clone(),
            tag: delivery.tag,
        };
        let mut queue = self.state.queues.get_mut(&delivery.queue).ok_or_else(unknown)?;
        if !queue.unacked.remove(&delivery.tag) {
            return Err(unknown());
        }
        queue.acked += 1;
        Ok(())
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn create_channel(&self) -> Result<Arc<dyn Channel>, BrokerError> {
        self.state.channels.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MemoryChannel {
            broker: self.clone(),
        }))
    }
}

#[derive(Debug)]
struct MemoryChannel {
    broker: InMemoryBroker,
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn consume(&self, queue: &str) -> Result<Deliveries, BrokerError> {
        self.broker.consume(queue)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.broker.ack(delivery)
    }

    async fn send_to_queue(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError> {
        self.broker.publish(queue, payload)
    }
}
