//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Trigger → accept loop stops → serve returns → socket released
//!     In-flight per-connection tasks keep running to completion
//! ```
//!
//! # Design Decisions
//! - Shutdown only stops acceptance; it never cancels connection tasks

pub mod shutdown;

pub use shutdown::Shutdown;
