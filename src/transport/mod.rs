//! Secure-transport integration subsystem.
//!
//! # Data Flow
//! ```text
//! raw (possibly throttled) byte stream + HandshakePolicy
//!     → upgrade.rs (Upgrade trait: key exchange + authentication)
//!     → SecureConnection + channel requests + global requests
//!     → drainer.rs consumes global requests in the background
//!     → session.rs composes the application-facing Session
//! ```
//!
//! # Design Decisions
//! - The handshake is a collaborator behind a trait; this crate never
//!   touches the wire format
//! - Global requests must always have a consumer or the multiplexer's
//!   internal queues back up; the drainer is that consumer
//! - Closing a secure connection is observable by every dependent task
//!   through a watch flag

pub mod drainer;
pub mod session;
pub mod upgrade;

pub use session::{Session, SessionError};
pub use upgrade::{
    AuthMethod, BoxedIo, ChannelRequest, ConnectionHandle, GlobalRequest, HandshakePolicy,
    PeerIdentity, SecureConnection, Upgrade, UpgradeError, Upgraded,
};
