//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, body limit, trace layer)
//!     → request.rs (split url, decode query, parse JSON body)
//!     → gateway middleware chain
//!     → response.rs (sink written by a handler or a reply consumer)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::Request;
pub use response::{HttpReply, ResponseSink};

/// Errors raised while turning a transport request into a [`Request`].
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("invalid JSON body: {0}")]
    InvalidBody(#[source] serde_json::Error),

    #[error("request body could not be read: {0}")]
    BodyRead(String),
}
