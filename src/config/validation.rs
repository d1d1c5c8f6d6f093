//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference configured microservices)
//! - Validate value formats (bind address, HTTP methods)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("microservice name must not be empty")]
    EmptyMicroserviceName,

    #[error("microservice {0:?} is configured more than once")]
    DuplicateMicroservice(String),

    #[error("route {path:?} references unknown microservice {microservice:?}")]
    UnknownMicroservice { path: String, microservice: String },

    #[error("route {path:?} has invalid method {method:?}")]
    InvalidMethod { path: String, method: String },

    #[error("route path {0:?} must start with '/'")]
    RoutePath(String),
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let mut names = HashSet::new();
    for microservice in &config.microservices {
        if microservice.name.is_empty() {
            errors.push(ValidationError::EmptyMicroserviceName);
        } else if !names.insert(microservice.name.as_str()) {
            errors.push(ValidationError::DuplicateMicroservice(microservice.name.clone()));
        }
    }

    for route in &config.routes {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RoutePath(route.path.clone()));
        }
        if !names.contains(route.microservice.as_str()) {
            errors.push(ValidationError::UnknownMicroservice {
                path: route.path.clone(),
                microservice: route.microservice.clone(),
            });
        }
        if let Some(method) = &route.method {
            if parse_method(method).is_none() {
                errors.push(ValidationError::InvalidMethod {
                    path: route.path.clone(),
                    method: method.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse a method name case-insensitively.
pub fn parse_method(method: &str) -> Option<Method> {
    if method.is_empty() {
        return None;
    }
    Method::from_bytes(method.to_ascii_uppercase().as_bytes()).ok()
}
