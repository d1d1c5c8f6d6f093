//! Message-queue API gateway library.
//!
//! Accepts HTTP requests, forwards them as messages to named
//! microservices over a broker and resumes the caller once the
//! correlated reply comes back.

pub mod broker;
pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod service;
pub mod wire;

pub use config::schema::GatewayConfig;
pub use gateway::{Gateway, GatewayError, GatewayHandle, GatewayResponse};
pub use http::{Request, ResponseSink};
pub use lifecycle::Shutdown;
pub use routing::{App, Next};
pub use service::Microservice;

/// Error type returned by request handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
