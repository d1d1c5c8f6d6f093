//! Reply consumers.
//!
//! # Responsibilities
//! - Start one responses-queue consumer per microservice, once
//! - Decode replies and complete the matching pending call
//! - Acknowledge every reply, including dropped ones
//!
//! # State Transitions
//! ```text
//! Uninitialized → Starting → Ready
//! Starting → Uninitialized   (a consumer failed to start)
//! ```

use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::try_join_all;
use tokio::sync::{broadcast, watch, Mutex};

use crate::broker::{Channel, Deliveries, Delivery, MicroserviceBinding};
use crate::gateway::{GatewayError, GatewayInner};
use crate::http::request::headers_from_json;
use crate::http::ResponseSink;
use crate::observability::metrics;
use crate::wire::ResponseMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Uninitialized,
    Starting,
    Ready,
}

/// Startup state of the reply consumers of one gateway.
#[derive(Debug)]
pub struct ConsumerLifecycle {
    start_lock: Mutex<()>,
    state: watch::Sender<ConsumerState>,
}

impl ConsumerLifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConsumerState::Uninitialized);
        Self {
            start_lock: Mutex::new(()),
            state,
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}

impl Default for ConsumerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// What happened to one reply message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplyOutcome {
    Completed,
    Orphaned,
    Malformed,
}

impl ReplyOutcome {
    fn as_str(self) -> &'static str {
        match self {
            ReplyOutcome::Completed => "completed",
            ReplyOutcome::Orphaned => "orphaned",
            ReplyOutcome::Malformed => "malformed",
        }
    }
}

impl GatewayInner {
    /// Start every reply consumer. A second call is a no-op.
    pub(crate) async fn start_consumers(self: &Arc<Self>) -> Result<(), GatewayError> {
        let _guard = self.consumers.start_lock.lock().await;
        if self.consumers.state() == ConsumerState::Ready {
            return Ok(());
        }
        self.consumers.set(ConsumerState::Starting);

        let opened = try_join_all(self.microservices.values().map(open_reply_consumer)).await;
        let consumers = match opened {
            Ok(consumers) => consumers,
            Err(e) => {
                self.consumers.set(ConsumerState::Uninitialized);
                return Err(e);
            }
        };

        for (microservice, channel, deliveries) in consumers {
            let gateway = Arc::clone(self);
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(async move {
                gateway.run_reply_consumer(microservice, channel, deliveries, shutdown).await;
            });
        }

        self.consumers.set(ConsumerState::Ready);
        tracing::info!(consumers = self.microservices.len(), "Reply consumers ready");
        Ok(())
    }

    async fn run_reply_consumer(
        self: Arc<Self>,
        microservice: String,
        channel: Arc<dyn Channel>,
        mut deliveries: Deliveries,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => {
                        self.complete(&microservice, channel.as_ref(), delivery).await;
                    }
                    None => {
                        tracing::warn!(
                            microservice = %microservice,
                            "Reply consumer cancelled by broker"
                        );
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::debug!(microservice = %microservice, "Reply consumer stopping");
                    break;
                }
            }
        }
    }

    /// Handle one reply and acknowledge it.
    pub(crate) async fn complete(
        &self,
        microservice: &str,
        channel: &dyn Channel,
        delivery: Delivery,
    ) -> ReplyOutcome {
        let outcome = self.settle(microservice, &delivery).await;
        metrics::record_reply(microservice, outcome.as_str());

        if let Err(e) = channel.ack(&delivery).await {
            tracing::warn!(microservice = %microservice, error = %e, "Failed to acknowledge reply");
        }
        outcome
    }

    async fn settle(&self, microservice: &str, delivery: &Delivery) -> ReplyOutcome {
        let reply: ResponseMessage = match serde_json::from_slice(&delivery.content) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    microservice = %microservice,
                    error = %e,
                    "Undecodable reply dropped"
                );
                return ReplyOutcome::Malformed;
            }
        };

        let Some(body) = reply.body() else {
            tracing::warn!(
                microservice = %microservice,
                request_id = %reply.request_id,
                "Reply without response dropped"
            );
            return ReplyOutcome::Malformed;
        };

        let Ok(status) = StatusCode::from_u16(reply.status_code) else {
            tracing::warn!(
                microservice = %microservice,
                request_id = %reply.request_id,
                status_code = reply.status_code,
                "Reply with invalid status dropped"
            );
            return ReplyOutcome::Malformed;
        };

        let Some(call) = self.pending.take(&reply.request_id) else {
            tracing::warn!(
                microservice = %microservice,
                request_id = %reply.request_id,
                "Reply for unknown request dropped"
            );
            return ReplyOutcome::Orphaned;
        };

        let mut sink = call.reply;
        sink.write_head(status, headers_from_json(&reply.headers));
        if let Err(e) = sink.end(body).await {
            tracing::debug!(request_id = %reply.request_id, error = %e, "Client gone before reply");
        }

        tracing::debug!(
            microservice = %microservice,
            request_id = %reply.request_id,
            status = status.as_u16(),
            elapsed_ms = call.created.elapsed().as_millis() as u64,
            "Reply delivered"
        );
        ReplyOutcome::Completed
    }
}

async fn open_reply_consumer(
    binding: &MicroserviceBinding,
) -> Result<(String, Arc<dyn Channel>, Deliveries), GatewayError> {
    let channel = binding.create_responses_channel().await?;
    let deliveries = channel.consume(binding.responses_queue()).await?;
    tracing::debug!(
        microservice = %binding.name(),
        queue = %binding.responses_queue(),
        "Reply consumer attached"
    );
    Ok((binding.name().to_string(), channel, deliveries))
}
