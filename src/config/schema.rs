//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! admission pipeline. All types derive Serde traits for deserialization
//! from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the admission pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, admission slots).
    pub listener: ListenerConfig,

    /// Per-connection byte-rate limiting for unauthenticated reads.
    pub rate_limit: RateLimitConfig,

    /// Handshake policy handed to the upgrade implementation.
    pub handshake: HandshakeConfig,

    /// Out-of-band request draining.
    pub drain: DrainConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:2022").
    pub bind_address: String,

    /// Maximum concurrent per-connection tasks (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:2022".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Byte-rate limiting applied to each connection's inbound stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether new connections get a rate-limited reader at all.
    pub enabled: bool,

    /// Sustained inbound throughput allowed per connection.
    pub bytes_per_second: u64,

    /// Burst allowance before throttling kicks in.
    pub burst_bytes: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bytes_per_second: 16 * 1024,
            burst_bytes: 64 * 1024,
        }
    }
}

/// Handshake policy knobs. Interpreted by the upgrade implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Identification string presented to clients.
    pub server_name: String,

    /// Authentication methods offered, in preference order.
    pub auth_methods: Vec<String>,

    /// Permitted algorithm names; empty means implementation defaults.
    pub algorithms: Vec<String>,

    /// Authentication attempts before the connection is rejected.
    pub max_auth_attempts: u32,

    /// Upper bound on the whole handshake, in milliseconds. 0 disables it.
    pub timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            server_name: "portcullis".to_string(),
            auth_methods: vec!["password".to_string(), "publickey".to_string()],
            algorithms: Vec::new(),
            max_auth_attempts: 3,
            timeout_ms: 0,
        }
    }
}

/// Out-of-band request draining.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Discards allowed per connection before it is closed. 0 means
    /// unbounded, matching classic server behavior.
    pub max_global_requests: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            max_global_requests: 0,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter when RUST_LOG is unset (e.g. "portcullis=debug").
    pub log_level: String,

    /// "full" or "compact" event formatting.
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "full".to_string(),
        }
    }
}
