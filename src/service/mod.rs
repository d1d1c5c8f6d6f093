//! Microservice side of the queue exchange.
//!
//! # Data Flow
//! ```text
//! <name>.requests
//!     → decode RequestMessage, rebuild Request
//!     → service chain (App<ServiceReply>)
//!     → reply.rs (ResponseMessage with the same requestId)
//!     → <name>.responses
//! ```
//!
//! # Design Decisions
//! - Each request is dispatched on its own task; acknowledged once its
//!   handlers return
//! - Undecodable requests are acknowledged and dropped
//! - A handler that never writes leaves the gateway waiting for its
//!   pending-call timeout

pub mod reply;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tokio::sync::broadcast;

use crate::broker::{BrokerError, Channel, Delivery, MicroserviceBinding};
use crate::http::request::headers_from_json;
use crate::http::{Request, ResponseSink};
use crate::routing::{App, MiddlewareChain, Next};
use crate::wire::RequestMessage;

pub use reply::ServiceReply;

/// A backend served from its requests queue.
pub struct Microservice {
    binding: Arc<MicroserviceBinding>,
    app: App<ServiceReply>,
}

impl Microservice {
    pub fn new(binding: MicroserviceBinding) -> Self {
        Self {
            binding: Arc::new(binding),
            app: App::new(),
        }
    }

    /// A service answering every request with a JSON description of it.
    pub fn echo(binding: MicroserviceBinding) -> Self {
        let mut service = Self::new(binding);
        let name = service.name().to_string();
        service
            .routes()
            .use_middleware(move |req: Request, res: ServiceReply, _next: Next<ServiceReply>| {
                let body = json!({
                    "microservice": name,
                    "method": req.method.as_str(),
                    "path": req.path,
                    "query": req.query,
                    "body": req.body,
                    "session": req.session,
                });
                async move { res.json(StatusCode::OK, body).await }
            });
        service
    }

    pub fn name(&self) -> &str {
        self.binding.name()
    }

    pub fn routes(&mut self) -> &mut App<ServiceReply> {
        &mut self.app
    }

    /// Consume the requests queue until shutdown or until the broker cancels.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), BrokerError> {
        let channel = self.binding.create_requests_channel().await?;
        let mut deliveries = channel.consume(self.binding.requests_queue()).await?;
        let (chain, _events) = self.app.into_parts();

        tracing::info!(
            microservice = %self.binding.name(),
            queue = %self.binding.requests_queue(),
            "Microservice consuming"
        );

        loop {
            tokio::select! {
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => {
                        tokio::spawn(handle_delivery(
                            Arc::clone(&chain),
                            Arc::clone(&self.binding),
                            Arc::clone(&channel),
                            delivery,
                        ));
                    }
                    None => {
                        tracing::warn!(
                            microservice = %self.binding.name(),
                            "Request consumer cancelled by broker"
                        );
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::debug!(microservice = %self.binding.name(), "Microservice stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn handle_delivery(
    chain: Arc<MiddlewareChain<ServiceReply>>,
    binding: Arc<MicroserviceBinding>,
    channel: Arc<dyn Channel>,
    delivery: Delivery,
) {
    match decode_request(&delivery.content) {
        Ok((request_id, req)) => {
            let reply = ServiceReply::new(request_id.clone(), Arc::clone(&binding));
            if let Err(e) = chain.dispatch(req, reply).await {
                tracing::error!(
                    microservice = %binding.name(),
                    request_id = %request_id,
                    error = %e,
                    "Handler failed"
                );
            }
        }
        Err(reason) => {
            tracing::warn!(
                microservice = %binding.name(),
                reason = %reason,
                "Undecodable request dropped"
            );
        }
    }

    if let Err(e) = channel.ack(&delivery).await {
        tracing::warn!(microservice = %binding.name(), error = %e, "Failed to acknowledge request");
    }
}

/// Rebuild the request carried by a queue message.
pub fn decode_request(content: &[u8]) -> Result<(String, Request), String> {
    let message: RequestMessage = serde_json::from_slice(content).map_err(|e| e.to_string())?;
    let method = Method::from_bytes(message.method.to_uppercase().as_bytes())
        .map_err(|_| format!("invalid method {:?}", message.method))?;

    let req = Request {
        method,
        path: message.path,
        query: message.payload.query,
        body: message.payload.body,
        headers: headers_from_json(&message.payload.headers),
        session: message.payload.session,
        params: HashMap::new(),
    };
    Ok((message.request_id, req))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, InMemoryBroker};
    use crate::wire::ResponseMessage;
    use bytes::Bytes;
    use std::time::Duration;

    fn request_bytes(request_id: &str, method: &str, path: &str) -> Bytes {
        let message = json!({
            "path": path,
            "method": method,
            "payload": {
                "query": {"q": "1"},
                "body": {"n": 2},
                "headers": {"x-trace": "t"},
                "session": {},
            },
            "requestId": request_id,
        });
        Bytes::from(message.to_string())
    }

    #[test]
    fn test_decode_request() {
        let (id, req) = decode_request(&request_bytes("r1", "post", "/users/1")).unwrap();
        assert_eq!(id, "r1");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/users/1");
        assert_eq!(req.query["q"], "1");
        assert_eq!(req.body["n"], 2);
        assert_eq!(req.headers.get("x-trace").unwrap(), "t");
    }

    #[test]
    fn test_decode_request_rejects_garbage() {
        assert!(decode_request(b"{}").is_err());
        assert!(decode_request(&request_bytes("r1", "not a method", "/")).is_err());
    }

    #[tokio::test]
    async fn test_service_answers_on_responses_queue() {
        let broker = InMemoryBroker::new();
        let binding = MicroserviceBinding::new("users", Arc::new(broker.clone()));
        let mut service = Microservice::new(binding);
        service.routes().get(
            "/users/:id",
            |req: Request, mut res: ServiceReply, _next: Next<ServiceReply>| async move {
                let mut headers = axum::http::HeaderMap::new();
                headers.insert("x-user", req.param("id").unwrap_or("").parse().unwrap());
                res.write_head(StatusCode::ACCEPTED, headers);
                res.end(Bytes::from_static(b"found")).await
            },
        );

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(service.run(rx));

        let listener = broker.create_channel().await.unwrap();
        let mut replies = listener.consume("users.responses").await.unwrap();
        broker.publish("users.requests", request_bytes("r9", "get", "/users/5")).unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), replies.recv())
            .await
            .unwrap()
            .unwrap();
        let reply: ResponseMessage = serde_json::from_slice(&delivery.content).unwrap();
        assert_eq!(reply.request_id, "r9");
        assert_eq!(reply.status_code, 202);
        assert_eq!(reply.headers["x-user"], "5");
        assert_eq!(reply.body().unwrap(), Bytes::from_static(b"found"));

        for _ in 0..200 {
            if broker.acked_count("users.requests") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.acked_count("users.requests"), 1);

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_request_is_acked() {
        let broker = InMemoryBroker::new();
        let binding = MicroserviceBinding::new("users", Arc::new(broker.clone()));
        let service = Microservice::echo(binding);
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(service.run(rx));

        broker.publish("users.requests", Bytes::from_static(b"garbage")).unwrap();
        for _ in 0..200 {
            if broker.acked_count("users.requests") == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.acked_count("users.requests"), 1);
        assert_eq!(broker.published_count("users.responses"), 0);

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
