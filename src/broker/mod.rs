//! Message broker subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway delegate:
//!     binding.rs (publishing channel, cached)
//!     → Channel::send_to_queue("<name>.requests", json)
//!
//! Microservice:
//!     Channel::consume("<name>.requests") → dispatch → send_to_queue("<name>.responses")
//!
//! Gateway reply consumer:
//!     Channel::consume("<name>.responses") → complete pending call → Channel::ack
//! ```
//!
//! # Design Decisions
//! - The broker client is an external collaborator behind two traits
//! - memory.rs is the in-process implementation used by the binary and tests
//! - Payloads are opaque bytes; the JSON shape lives in `wire`

pub mod binding;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use binding::MicroserviceBinding;
pub use memory::InMemoryBroker;

/// Errors reported by a broker implementation.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("queue {0} already has a consumer")]
    AlreadyConsumed(String),

    #[error("unknown delivery {tag} on queue {queue}")]
    UnknownDelivery { queue: String, tag: u64 },

    #[error("broker connection closed")]
    Closed,
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub tag: u64,
    pub content: Bytes,
}

/// Stream of deliveries for one consumer. `None` means the consumer was cancelled.
#[derive(Debug)]
pub struct Deliveries {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Deliveries {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// A broker connection able to open channels.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    async fn create_channel(&self) -> Result<Arc<dyn Channel>, BrokerError>;
}

/// One broker channel.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    async fn consume(&self, queue: &str) -> Result<Deliveries, BrokerError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    async fn send_to_queue(&self, queue: &str, payload: Bytes) -> Result<(), BrokerError>;
}
