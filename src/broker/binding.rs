//! Per-microservice broker binding.
//!
//! # Responsibilities
//! - Hold the requests/responses queue names of one backend
//! - Open consumer channels for either direction
//! - Lazily create and cache the publishing channel
//!
//! # Design Decisions
//! - Built once from configuration, immutable afterward
//! - Queue names default to `<name>.requests` / `<name>.responses`

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::broker::{Broker, BrokerError, Channel};
use crate::config::MicroserviceConfig;

pub struct MicroserviceBinding {
    name: String,
    requests_queue: String,
    responses_queue: String,
    broker: Arc<dyn Broker>,
    publisher: OnceCell<Arc<dyn Channel>>,
}

impl MicroserviceBinding {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        let name = name.into();
        Self {
            requests_queue: format!("{}.requests", name),
            responses_queue: format!("{}.responses", name),
            name,
            broker,
            publisher: OnceCell::new(),
        }
    }

    pub fn from_config(config: &MicroserviceConfig, broker: Arc<dyn Broker>) -> Self {
        let mut binding = Self::new(config.name.clone(), broker);
        if let Some(queue) = &config.requests_queue {
            binding.requests_queue = queue.clone();
        }
        if let Some(queue) = &config.responses_queue {
            binding.responses_queue = queue.clone();
        }
        binding
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requests_queue(&self) -> &str {
        &self.requests_queue
    }

    pub fn responses_queue(&self) -> &str {
        &self.responses_queue
    }

    /// Fresh channel for consuming this backend's replies.
    pub async fn create_responses_channel(&self) -> Result<Arc<dyn Channel>, BrokerError> {
        self.broker.create_channel().await
    }

    /// Fresh channel for consuming this backend's requests.
    pub async fn create_requests_channel(&self) -> Result<Arc<dyn Channel>, BrokerError> {
        self.broker.create_channel().await
    }

    /// Shared channel used to publish in either direction.
    pub async fn publisher(&self) -> Result<Arc<dyn Channel>, BrokerError> {
        self.publisher
            .get_or_try_init(|| async {
                tracing::debug!(microservice = %self.name, "Opening publishing channel");
                self.broker.create_channel().await
            })
            .await
            .cloned()
    }
}

impl fmt::Debug for MicroserviceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroserviceBinding")
            .field("name", &self.name)
            .field("requests_queue", &self.requests_queue)
            .field("responses_queue", &self.responses_queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    #[test]
    fn test_default_queue_names() {
        let binding = MicroserviceBinding::new("users", Arc::new(InMemoryBroker::new()));
        assert_eq!(binding.requests_queue(), "users.requests");
        assert_eq!(binding.responses_queue(), "users.responses");
    }

    #[test]
    fn test_queue_overrides_from_config() {
        let config = MicroserviceConfig {
            name: "orders".into(),
            requests_queue: Some("orders-in".into()),
            responses_queue: None,
        };
        let binding = MicroserviceBinding::from_config(&config, Arc::new(InMemoryBroker::new()));
        assert_eq!(binding.requests_queue(), "orders-in");
        assert_eq!(binding.responses_queue(), "orders.responses");
    }

    #[tokio::test]
    async fn test_publisher_is_cached() {
        let broker = InMemoryBroker::new();
        let binding = MicroserviceBinding::new("users", Arc::new(broker.clone()));
        let first = binding.publisher().await.unwrap();
        let second = binding.publisher().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(broker.channels_created(), 1);
    }
}
