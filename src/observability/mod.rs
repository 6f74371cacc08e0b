//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → whatever subscriber/recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - Connection IDs flow through log fields for correlation
//! - Metric updates are cheap (atomic increments behind the metrics crate)
//! - No exporter is wired here; a library should not own the process's
//!   telemetry endpoints

pub mod logging;
pub mod metrics;
