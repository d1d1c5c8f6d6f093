//! Correlation gateway subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → gateway chain (App<GatewayResponse>)
//!     → delegate.rs (park sink under a UUID, publish on <name>.requests)
//!     ... microservice works ...
//!     → consumers.rs (reply on <name>.responses, take sink by requestId)
//!     → sink written, reply acknowledged
//!
//! sweeper.rs: sinks parked longer than the TTL get a 504
//! shutdown:   sinks still parked get a 503
//! ```
//!
//! # Design Decisions
//! - The pending map only holds HTTP sinks, never the gateway itself
//! - Consumer startup is a per-gateway state machine, so several
//!   gateways can share one broker and one process
//! - Lifecycle events are only emitted when someone listens for them

pub mod consumers;
pub mod delegate;
pub mod pending;
pub mod sweeper;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::Value;
use tokio::net::TcpListener;

use crate::broker::{Broker, BrokerError, MicroserviceBinding};
use crate::config::validation::parse_method;
use crate::config::GatewayConfig;
use crate::http::server::{build_router, ServerState};
use crate::http::{HttpReply, Request, ResponseSink};
use crate::lifecycle::Shutdown;
use crate::routing::{handler, App, BoxHandler, EventEmitter, Next};
use crate::BoxError;

pub use consumers::{ConsumerLifecycle, ConsumerState};
pub use delegate::GatewayResponse;
pub use pending::{PendingCall, PendingCalls};
pub use sweeper::PendingSweeper;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Microservice {0} not found")]
    MicroserviceNotFound(String),

    #[error("gateway is shutting down")]
    ShuttingDown,

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("failed to encode request message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by HTTP tasks, reply consumers and the sweeper.
#[derive(Debug)]
pub(crate) struct GatewayInner {
    pub(crate) microservices: HashMap<String, MicroserviceBinding>,
    pub(crate) pending: Arc<PendingCalls>,
    pub(crate) consumers: ConsumerLifecycle,
    pub(crate) shutdown: Shutdown,
}

impl GatewayInner {
    /// Answer every parked call with 503.
    async fn abandon_pending(&self) {
        let calls = self.pending.drain();
        if calls.is_empty() {
            return;
        }
        tracing::info!(count = calls.len(), "Answering pending calls on shutdown");
        for (request_id, call) in calls {
            if let Err(e) = call
                .reply
                .send(StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(b"Service Unavailable"))
                .await
            {
                tracing::debug!(
                    request_id = %request_id,
                    error = %e,
                    "Client gone before shutdown reply"
                );
            }
        }
    }
}

/// HTTP front that forwards requests to microservices over a broker.
pub struct Gateway {
    app: App<GatewayResponse>,
    inner: Arc<GatewayInner>,
    pending_timeout: Option<Duration>,
    sweep_interval: Duration,
    max_body_bytes: usize,
}

impl Gateway {
    pub fn new(bindings: Vec<MicroserviceBinding>, shutdown: Shutdown) -> Self {
        let microservices = bindings
            .into_iter()
            .map(|binding| (binding.name().to_string(), binding))
            .collect();
        Self {
            app: App::new(),
            inner: Arc::new(GatewayInner {
                microservices,
                pending: Arc::new(PendingCalls::new()),
                consumers: ConsumerLifecycle::new(),
                shutdown,
            }),
            pending_timeout: Some(Duration::from_secs(30)),
            sweep_interval: Duration::from_millis(1000),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }

    /// Build bindings and config-declared routes from a validated config.
    pub fn from_config(
        config: &GatewayConfig,
        broker: Arc<dyn Broker>,
        shutdown: Shutdown,
    ) -> Self {
        let bindings = config
            .microservices
            .iter()
            .map(|ms| MicroserviceBinding::from_config(ms, Arc::clone(&broker)))
            .collect();

        let pending_timeout = match config.gateway.pending_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let mut gateway = Self::new(bindings, shutdown)
            .with_pending_timeout(pending_timeout)
            .with_sweep_interval(Duration::from_millis(config.gateway.sweep_interval_ms))
            .with_max_body_bytes(config.listener.max_body_bytes);

        for route in &config.routes {
            let method = match route.method.as_deref() {
                None => None,
                Some(raw) => match parse_method(raw) {
                    Some(method) => Some(method),
                    None => {
                        tracing::warn!(
                            path = %route.path,
                            method = %raw,
                            "Skipping route with invalid method"
                        );
                        continue;
                    }
                },
            };
            gateway.app.route(
                Some(route.path.as_str().into()),
                method,
                vec![delegate_to(route.microservice.clone())],
            );
            tracing::debug!(
                path = %route.path,
                method = route.method.as_deref().unwrap_or("*"),
                microservice = %route.microservice,
                "Route registered"
            );
        }
        gateway
    }

    /// `None` keeps calls pending until a reply or shutdown.
    pub fn with_pending_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Clamped to at least one millisecond.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Registration surface of the gateway's own pipeline.
    pub fn routes(&mut self) -> &mut App<GatewayResponse> {
        &mut self.app
    }

    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    pub async fn start_consumers(&self) -> Result<(), GatewayError> {
        self.inner.start_consumers().await
    }

    /// Start the reply consumers, then serve HTTP on `listener` until shutdown.
    pub async fn listen(self, listener: TcpListener) -> Result<(), GatewayError> {
        self.inner.start_consumers().await?;
        let (chain, events) = self.app.into_parts();
        emit_if_handled(&events, "consumers:ready", &[]);

        if let Some(ttl) = self.pending_timeout {
            let sweeper =
                PendingSweeper::new(Arc::clone(&self.inner.pending), ttl, self.sweep_interval);
            tokio::spawn(sweeper.run(self.inner.shutdown.subscribe()));
        }

        let addr = listener.local_addr()?;
        let router = build_router(ServerState {
            chain,
            gateway: Arc::clone(&self.inner),
            max_body_bytes: self.max_body_bytes,
        });

        tracing::info!(
            address = %addr,
            microservices = self.inner.microservices.len(),
            "Gateway listening"
        );
        emit_if_handled(&events, "listening", &[Value::String(addr.to_string())]);

        let inner = Arc::clone(&self.inner);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                inner.shutdown.wait().await;
                tracing::info!("Gateway shutting down");
                // Parked exchanges would hold their connections open forever.
                inner.abandon_pending().await;
            })
            .await?;

        self.inner.abandon_pending().await;
        emit_if_handled(&events, "shutdown", &[]);
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

fn emit_if_handled(events: &EventEmitter, event: &str, args: &[Value]) {
    if events.has_handler(event) {
        events.emit(event, args);
    }
}

/// Handler that forwards every request it receives to `microservice`.
pub fn delegate_to(microservice: impl Into<String>) -> BoxHandler<GatewayResponse> {
    let microservice: Arc<str> = Arc::from(microservice.into());
    handler(move |req: Request, res: GatewayResponse, _next: Next<GatewayResponse>| {
        let microservice = Arc::clone(&microservice);
        async move {
            res.delegate(&req, &microservice)
                .await
                .map(|_| ())
                .map_err(BoxError::from)
        }
    })
}

/// Cheap handle onto a gateway's shared state, usable after `listen` took the gateway.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    inner: Arc<GatewayInner>,
}

impl GatewayHandle {
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        self.inner.pending.contains(request_id)
    }

    pub fn consumer_state(&self) -> ConsumerState {
        self.inner.consumers.state()
    }

    pub async fn start_consumers(&self) -> Result<(), GatewayError> {
        self.inner.start_consumers().await
    }

    /// Wrap a sink so it can be delegated through this gateway.
    pub fn response(&self, reply: HttpReply) -> GatewayResponse {
        GatewayResponse::new(reply, Arc::clone(&self.inner))
    }

    pub fn microservices(&self) -> impl Iterator<Item = &str> {
        self.inner.microservices.keys().map(String::as_str)
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.trigger();
    }
}
