//! Portcullis: connection admission for secure-transport servers.
//!
//! Accepts inbound TCP connections, caps the byte rate an unauthenticated
//! peer can impose on the handshake parser, upgrades each raw connection
//! into an authenticated multiplexed session through a caller-supplied
//! handshake implementation, and hands finished sessions to a handler
//! callback, all without letting one connection's handshake delay the
//! accept loop.
//!
//! # Architecture Overview
//!
//! ```text
//! inbound TCP connection
//!     → net::listener   (accept loop, admission slots)
//!     → net::throttle   (per-connection byte-rate cap on reads)
//!     → transport::upgrade  (key exchange + auth, via the Upgrade trait)
//!     → transport::drainer  (background discard of out-of-band requests)
//!     → transport::session  (application-facing session)
//!     → handler callback
//!
//! Cross-cutting:
//!     config        TOML schema, loader, validation
//!     observability logging (tracing) + metrics
//!     lifecycle     shutdown coordination
//! ```
//!
//! The cryptographic handshake itself is not implemented here; it is an
//! external collaborator behind [`transport::upgrade::Upgrade`].

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod transport;

pub use config::schema::ServerConfig;
pub use lifecycle::Shutdown;
pub use net::listener::{AdmissionLimits, Listener, ListenerError};
pub use net::throttle::{ReadLimiter, Throttled};
pub use transport::session::{Session, SessionError};
pub use transport::upgrade::{
    BoxedIo, HandshakePolicy, PeerIdentity, SecureConnection, Upgrade, UpgradeError, Upgraded,
};
