//! Reply sink of a microservice.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;

use crate::broker::MicroserviceBinding;
use crate::http::request::headers_to_json;
use crate::http::ResponseSink;
use crate::wire::ResponseMessage;
use crate::BoxError;

/// Publishes whatever the handler writes on the responses queue,
/// tagged with the correlation identifier of the request.
#[derive(Debug)]
pub struct ServiceReply {
    request_id: String,
    status: StatusCode,
    headers: HeaderMap,
    binding: Arc<MicroserviceBinding>,
}

impl ServiceReply {
    pub fn new(request_id: impl Into<String>, binding: Arc<MicroserviceBinding>) -> Self {
        Self {
            request_id: request_id.into(),
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            binding,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

#[async_trait]
impl ResponseSink for ServiceReply {
    fn write_head(&mut self, status: StatusCode, headers: HeaderMap) {
        self.status = status;
        self.headers.extend(headers);
    }

    async fn end(self, body: Bytes) -> Result<(), BoxError> {
        let message = ResponseMessage::new(
            self.request_id,
            self.status.as_u16(),
            headers_to_json(&self.headers),
            &body,
        );
        let payload = serde_json::to_vec(&message)?;
        let channel = self.binding.publisher().await?;
        channel
            .send_to_queue(self.binding.responses_queue(), Bytes::from(payload))
            .await?;
        tracing::debug!(
            microservice = %self.binding.name(),
            request_id = %message.request_id,
            status = message.status_code,
            "Reply published"
        );
        Ok(())
    }
}
