//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the axum router with a single catch-all handler
//! - Read and bound the request body
//! - Build a [`Request`] and dispatch it through the gateway chain
//! - Wait for the sink to be written, by a handler or a reply consumer
//!
//! # Design Decisions
//! - The chain never answers on its own; an exchange nobody wrote to is a 404
//! - A handler error is answered with 500 even if the sink was already parked,
//!   except a delegation refused during shutdown (503)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{Request as HttpRequest, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::gateway::{GatewayError, GatewayInner, GatewayResponse};
use crate::http::{HttpError, HttpReply, Request};
use crate::observability::metrics;
use crate::routing::MiddlewareChain;

/// Application state injected into the handler.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub chain: Arc<MiddlewareChain<GatewayResponse>>,
    pub gateway: Arc<GatewayInner>,
    pub max_body_bytes: usize,
}

pub(crate) fn build_router(state: ServerState) -> Router {
    Router::new()
        .fallback(gateway_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn gateway_handler(State(state): State<ServerState>, request: HttpRequest<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = serve(&state, request).await;
    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

async fn serve(state: &ServerState, request: HttpRequest<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let url = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = HttpError::BodyRead(e.to_string());
            tracing::warn!(path = %parts.uri.path(), error = %err, "Rejecting request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()).into_response();
        }
    };

    let req = match Request::from_http(parts.method, &url, parts.headers, &bytes) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Rejecting request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    tracing::debug!(method = %req.method, path = %req.path, "Dispatching request");

    let (reply, rx) = HttpReply::channel();
    let res = GatewayResponse::new(reply, Arc::clone(&state.gateway));
    let path = req.path.clone();

    if let Err(e) = state.chain.dispatch(req, res).await {
        if let Some(GatewayError::ShuttingDown) = e.downcast_ref::<GatewayError>() {
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
        tracing::error!(path = %path, error = %e, "Handler failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    match rx.await {
        Ok(response) => response,
        Err(_) => {
            tracing::debug!(path = %path, "Exchange ended without a response");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
