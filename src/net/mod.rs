//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, admission slots)
//!     → throttle.rs (byte-rate cap on untrusted reads)
//!     → transport::upgrade (handshake, owned by the per-connection task)
//!     → Hand off to session handler
//!
//! Accept loop states:
//!     Running → Draining → Closed
//! ```
//!
//! # Design Decisions
//! - Acceptance never waits on a handshake; each connection gets its own task
//! - Admission slots bound concurrent per-connection tasks
//! - Only inbound bytes are throttled; the handshake parser is the asset
//!   being protected, not outbound traffic

pub mod connection;
pub mod listener;
pub mod throttle;
