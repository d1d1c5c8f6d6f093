//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Microservices reachable over the broker.
    pub microservices: Vec<MicroserviceConfig>,

    /// Routes delegating to microservices, registered in file order.
    pub routes: Vec<RouteConfig>,

    /// Pending-call bookkeeping.
    pub gateway: PendingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// A backend reachable only through its two queues.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MicroserviceConfig {
    /// Logical name used by `delegate`.
    pub name: String,

    /// Overrides the default `<name>.requests` queue.
    #[serde(default)]
    pub requests_queue: Option<String>,

    /// Overrides the default `<name>.responses` queue.
    #[serde(default)]
    pub responses_queue: Option<String>,
}

/// Route forwarding matching requests to a microservice.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path pattern (e.g., "/users/:id").
    pub path: String,

    /// HTTP method; any method when absent.
    #[serde(default)]
    pub method: Option<String>,

    /// Name of the microservice to delegate to.
    pub microservice: String,
}

/// Pending-call configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PendingConfig {
    /// Seconds a delegated call may wait for its reply; 0 waits forever.
    pub pending_timeout_secs: u64,

    /// How often expired calls are swept, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            pending_timeout_secs: 30,
            sweep_interval_ms: 1000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
