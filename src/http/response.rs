//! Response sinks.
//!
//! # Responsibilities
//! - Define the `write_head` / `end` surface handlers answer through
//! - Turn a sink's head and body into an axum response
//!
//! # Design Decisions
//! - `end` consumes the sink: a response is written at most once
//! - A sink that never had `write_head` called answers 200

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::BoxError;

/// Where a handler writes its response.
#[async_trait]
pub trait ResponseSink: Send + Sized + 'static {
    /// Set the status line and headers.
    fn write_head(&mut self, status: StatusCode, headers: HeaderMap);

    /// Write the body and finish the exchange.
    async fn end(self, body: Bytes) -> Result<(), BoxError>;

    async fn send(mut self, status: StatusCode, body: Bytes) -> Result<(), BoxError> {
        self.write_head(status, HeaderMap::new());
        self.end(body).await
    }

    async fn json(mut self, status: StatusCode, value: serde_json::Value) -> Result<(), BoxError> {
        let body = serde_json::to_vec(&value)?;
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.write_head(status, headers);
        self.end(Bytes::from(body)).await
    }
}

/// Sink backed by a pending axum handler.
///
/// The HTTP side awaits the paired receiver; dropping the sink without
/// calling `end` closes the receiver.
#[derive(Debug)]
pub struct HttpReply {
    status: StatusCode,
    headers: HeaderMap,
    tx: oneshot::Sender<Response<Body>>,
}

impl HttpReply {
    pub fn channel() -> (Self, oneshot::Receiver<Response<Body>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                tx,
            },
            rx,
        )
    }

    /// True once the waiting HTTP side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[async_trait]
impl ResponseSink for HttpReply {
    fn write_head(&mut self, status: StatusCode, headers: HeaderMap) {
        self.status = status;
        self.headers.extend(headers);
    }

    async fn end(self, body: Bytes) -> Result<(), BoxError> {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        self.tx.send(response).map_err(|_| -> BoxError {
            "client disconnected before the response was written".into()
        })
    }
}
