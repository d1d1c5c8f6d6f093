//! Delegation of a request to a microservice.
//!
//! # Responsibilities
//! - Park the HTTP sink under a fresh correlation identifier
//! - Publish the request message on the backend's requests queue
//! - Undo the parking when publishing fails

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

use crate::gateway::{GatewayError, GatewayInner};
use crate::http::{HttpReply, Request, ResponseSink};
use crate::observability::metrics;
use crate::wire::RequestMessage;
use crate::BoxError;

/// Sink handed to gateway handlers.
///
/// Either answer directly like any [`ResponseSink`], or hand the exchange
/// to a microservice with [`GatewayResponse::delegate`].
#[derive(Debug)]
pub struct GatewayResponse {
    reply: HttpReply,
    gateway: Arc<GatewayInner>,
}

impl GatewayResponse {
    pub(crate) fn new(reply: HttpReply, gateway: Arc<GatewayInner>) -> Self {
        Self { reply, gateway }
    }

    /// Forward `req` to `microservice`; the reply consumer answers later.
    ///
    /// Returns the correlation identifier of the published message.
    pub async fn delegate(self, req: &Request, microservice: &str) -> Result<String, GatewayError> {
        self.gateway.delegate(req, microservice, self.reply).await
    }
}

#[async_trait]
impl ResponseSink for GatewayResponse {
    fn write_head(&mut self, status: StatusCode, headers: HeaderMap) {
        self.reply.write_head(status, headers);
    }

    async fn end(self, body: Bytes) -> Result<(), BoxError> {
        self.reply.end(body).await
    }
}

impl GatewayInner {
    pub(crate) async fn delegate(
        &self,
        req: &Request,
        microservice: &str,
        reply: HttpReply,
    ) -> Result<String, GatewayError> {
        if self.shutdown.is_triggered() {
            return Err(GatewayError::ShuttingDown);
        }
        let binding = self
            .microservices
            .get(microservice)
            .ok_or_else(|| GatewayError::MicroserviceNotFound(microservice.to_string()))?;

        let channel = binding.publisher().await?;
        let request_id = self.pending.insert(microservice, reply);
        // The shutdown drain may have run between the check above and the insert.
        if self.shutdown.is_triggered() && self.pending.take(&request_id).is_some() {
            return Err(GatewayError::ShuttingDown);
        }

        let message = RequestMessage::from_request(req, request_id.clone());
        let published = match serde_json::to_vec(&message) {
            Ok(payload) => channel
                .send_to_queue(binding.requests_queue(), Bytes::from(payload))
                .await
                .map_err(GatewayError::from),
            Err(e) => Err(GatewayError::from(e)),
        };

        if let Err(e) = published {
            self.pending.take(&request_id);
            tracing::error!(
                microservice = %microservice,
                request_id = %request_id,
                error = %e,
                "Failed to publish request"
            );
            return Err(e);
        }

        metrics::record_delegated(microservice);
        tracing::debug!(
            microservice = %microservice,
            request_id = %request_id,
            queue = %binding.requests_queue(),
            method = %req.method,
            path = %req.path,
            "Request delegated"
        );
        Ok(request_id)
    }
}
