//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, admission slots > 0)
//! - Reject unknown authentication method names early
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;
use crate::transport::upgrade::AuthMethod;

/// One semantic violation, tied to the field that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check everything that serde cannot.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "listener.bind_address".to_string(),
            message: format!("not a valid socket address: {:?}", config.listener.bind_address),
        });
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError {
            field: "listener.max_connections".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if config.rate_limit.enabled {
        if config.rate_limit.bytes_per_second == 0 {
            errors.push(ValidationError {
                field: "rate_limit.bytes_per_second".to_string(),
                message: "must be greater than zero when rate limiting is enabled".to_string(),
            });
        }
        if config.rate_limit.burst_bytes == 0 {
            errors.push(ValidationError {
                field: "rate_limit.burst_bytes".to_string(),
                message: "must be greater than zero when rate limiting is enabled".to_string(),
            });
        }
    }

    if config.handshake.auth_methods.is_empty() {
        errors.push(ValidationError {
            field: "handshake.auth_methods".to_string(),
            message: "at least one authentication method is required".to_string(),
        });
    }
    for method in &config.handshake.auth_methods {
        if AuthMethod::parse(method).is_none() {
            errors.push(ValidationError {
                field: "handshake.auth_methods".to_string(),
                message: format!("unknown authentication method: {:?}", method),
            });
        }
    }

    if config.handshake.max_auth_attempts == 0 {
        errors.push(ValidationError {
            field: "handshake.max_auth_attempts".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
