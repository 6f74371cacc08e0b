//! The secure-transport upgrade interface.
//!
//! The [`Upgrade`] trait abstracts the cryptographic handshake that turns a
//! raw byte stream into an authenticated, multiplexed connection. This crate
//! supplies the admission pipeline around it; implementations supply the
//! actual key exchange, cipher negotiation, and authentication.
//!
//! An implementation receives exclusive ownership of the stream and the
//! shared [`HandshakePolicy`], and on success returns an [`Upgraded`] bundle:
//! the connection handle plus two request streams. Channel requests go to the
//! session layer; global requests go to the background drainer.

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::schema::HandshakeConfig;

/// Marker trait for the byte streams handed to an upgrader.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// Boxed bidirectional stream. Erases whether the connection is throttled.
pub type BoxedIo = Box<dyn Io>;

/// Authentication methods a server is willing to negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Password,
    PublicKey,
}

impl AuthMethod {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "password" => Some(Self::Password),
            "publickey" => Some(Self::PublicKey),
            _ => None,
        }
    }
}

/// Static handshake policy shared by every per-connection task.
///
/// Opaque to the accept pipeline; only the upgrader interprets it.
#[derive(Debug, Clone)]
pub struct HandshakePolicy {
    /// Identification string presented to clients.
    pub server_name: String,
    /// Authentication methods offered, in preference order.
    pub auth_methods: Vec<AuthMethod>,
    /// Permitted algorithm names; empty means implementation defaults.
    pub algorithms: Vec<String>,
    /// Attempts before the upgrader must reject the connection.
    pub max_auth_attempts: u32,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            server_name: "portcullis".to_string(),
            auth_methods: vec![AuthMethod::Password, AuthMethod::PublicKey],
            algorithms: Vec::new(),
            max_auth_attempts: 3,
        }
    }
}

impl HandshakePolicy {
    /// Build a policy from the `[handshake]` config section. Unknown
    /// method names are skipped; validation reports them beforehand.
    pub fn from_config(cfg: &HandshakeConfig) -> Self {
        Self {
            server_name: cfg.server_name.clone(),
            auth_methods: cfg
                .auth_methods
                .iter()
                .filter_map(|m| AuthMethod::parse(m))
                .collect(),
            algorithms: cfg.algorithms.clone(),
            max_auth_attempts: cfg.max_auth_attempts,
        }
    }
}

/// Who authenticated on the other end of an upgraded connection.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub username: String,
    pub client_version: String,
}

/// An out-of-band protocol message not tied to any channel.
///
/// Dropping an unanswered request (reply sender included) is the protocol
/// layer's automatic refusal, which is exactly what the drainer relies on.
#[derive(Debug)]
pub struct GlobalRequest {
    pub kind: String,
    pub want_reply: bool,
    pub payload: Vec<u8>,
    pub reply: Option<oneshot::Sender<Vec<u8>>>,
}

/// A request to open a new logical sub-stream on an upgraded connection.
#[derive(Debug)]
pub struct ChannelRequest {
    pub kind: String,
    pub payload: Vec<u8>,
}

/// Shared close-signal for one secure connection.
///
/// Cheap to clone; every dependent task (drainer, session consumers)
/// observes the flag flip promptly.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    closed: std::sync::Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            closed: std::sync::Arc::new(tx),
        }
    }

    /// Mark the connection closed. Idempotent.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Result of a successful handshake: the authenticated connection.
///
/// Terminated when either side closes the underlying transport; the
/// implementation flips the close flag, and [`close`](Self::close) lets the
/// server side initiate it.
#[derive(Debug)]
pub struct SecureConnection {
    peer: PeerIdentity,
    handle: ConnectionHandle,
}

impl SecureConnection {
    pub fn new(peer: PeerIdentity) -> Self {
        Self {
            peer,
            handle: ConnectionHandle::new(),
        }
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub async fn closed(&self) {
        self.handle.closed().await;
    }
}

/// Everything a successful upgrade yields.
#[derive(Debug)]
pub struct Upgraded {
    pub connection: SecureConnection,
    /// Inbound requests to open logical sub-streams; consumed by the session.
    pub channels: mpsc::UnboundedReceiver<ChannelRequest>,
    /// Inbound out-of-band requests; consumed by the drainer.
    pub requests: mpsc::UnboundedReceiver<GlobalRequest>,
}

/// Why a handshake failed. Recoverable at the server level: the offending
/// connection is dropped and the accept loop continues.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),
    #[error("authentication rejected for {0}")]
    AuthRejected(String),
    #[error("malformed handshake data: {0}")]
    Malformed(String),
    #[error("handshake timed out")]
    TimedOut,
    #[error("handshake i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpgradeError {
    /// Stable label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProtocolMismatch(_) => "protocol",
            Self::AuthRejected(_) => "auth",
            Self::Malformed(_) => "malformed",
            Self::TimedOut => "timeout",
            Self::Io(_) => "io",
        }
    }
}

/// Performs the secure-transport handshake over a raw stream.
///
/// Implementations must be shareable across per-connection tasks; the
/// pipeline calls `upgrade` concurrently for every accepted connection.
/// The call runs entirely inside the connection's own task and may block
/// on network I/O for as long as the configured handshake timeout allows.
#[async_trait]
pub trait Upgrade: Send + Sync + 'static {
    async fn upgrade(
        &self,
        stream: BoxedIo,
        policy: &HandshakePolicy,
    ) -> Result<Upgraded, UpgradeError>;
}
