//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for embedders that want a default
//! - Configure log level from config, overridable via RUST_LOG
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Initialization is optional; an embedder with its own subscriber
//!   simply never calls this

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::ObservabilityConfig;

/// Install a global subscriber honoring `RUST_LOG` first and the config's
/// `log_level` as the fallback filter. Safe to call more than once; later
/// calls are no-ops.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.log_format == "compact" {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    }
}
