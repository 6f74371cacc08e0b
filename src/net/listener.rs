//! TCP listener and accept loop for the admission pipeline.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections without waiting on any handshake
//! - Enforce the admission-slot limit via semaphore
//! - Run each connection's throttle → upgrade → drain → session sequence
//!   on its own task
//!
//! # Design Decisions
//! - An accept error is fatal to the server; there is no retry on a
//!   broken listener
//! - A failed handshake is local to its connection: logged, counted,
//!   dropped
//! - The handler callback runs on the connection's task, never on the
//!   accept loop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::config::schema::ServerConfig;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ActiveConnections, ConnectionGuard};
use crate::net::throttle::{ReadLimiter, Throttled};
use crate::observability::metrics;
use crate::transport::drainer;
use crate::transport::session::Session;
use crate::transport::upgrade::{BoxedIo, HandshakePolicy, Upgrade, UpgradeError};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection. Fatal to the accept loop.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Bounds applied to the admission pipeline as a whole.
#[derive(Debug, Clone)]
pub struct AdmissionLimits {
    /// Concurrent per-connection tasks allowed.
    pub max_connections: usize,
    /// Upper bound on one handshake; `None` leaves a hung handshake
    /// occupying its task indefinitely.
    pub handshake_timeout: Option<Duration>,
    /// Out-of-band requests discarded per connection before it is closed.
    pub max_global_requests: Option<u64>,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            handshake_timeout: None,
            max_global_requests: None,
        }
    }
}

impl AdmissionLimits {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_connections: config.listener.max_connections,
            handshake_timeout: (config.handshake.timeout_ms > 0)
                .then(|| Duration::from_millis(config.handshake.timeout_ms)),
            max_global_requests: (config.drain.max_global_requests > 0)
                .then_some(config.drain.max_global_requests),
        }
    }
}

/// Produces one fresh limiter per accepted connection.
pub type LimiterFactory = Arc<dyn Fn() -> ReadLimiter + Send + Sync>;

/// Invoked once per successfully established session, on that
/// connection's own task.
pub type SessionHandler = Arc<dyn Fn(Session) + Send + Sync>;

/// Accepts raw connections and upgrades them into secure sessions.
///
/// Owns the listening socket; the socket is released when [`serve`]
/// returns. The handler must be installed before `serve`, otherwise each
/// established session is dropped with a warning.
///
/// [`serve`]: Listener::serve
pub struct Listener<U> {
    inner: TcpListener,
    policy: Arc<HandshakePolicy>,
    upgrader: Arc<U>,
    read_limit: Option<LimiterFactory>,
    handler: Option<SessionHandler>,
    limits: AdmissionLimits,
    connections: ActiveConnections,
    shutdown: Shutdown,
    // Subscribed at bind time so a trigger issued before serve() starts
    // polling is not lost.
    shutdown_rx: tokio::sync::broadcast::Receiver<()>,
}

impl<U: Upgrade> Listener<U> {
    /// Bind to `addr` with default limits, no throttling, and no handler.
    pub async fn bind(
        addr: &str,
        policy: Arc<HandshakePolicy>,
        upgrader: Arc<U>,
    ) -> Result<Self, ListenerError> {
        let addr: SocketAddr = addr.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let inner = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        let limits = AdmissionLimits::default();
        tracing::info!(
            address = %local_addr,
            max_connections = limits.max_connections,
            "listener bound"
        );

        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();
        Ok(Self {
            inner,
            policy,
            upgrader,
            read_limit: None,
            handler: None,
            connections: ActiveConnections::new(limits.max_connections),
            limits,
            shutdown,
            shutdown_rx,
        })
    }

    /// Throttle every accepted connection with a limiter from `factory`.
    pub fn with_read_limit(
        mut self,
        factory: impl Fn() -> ReadLimiter + Send + Sync + 'static,
    ) -> Self {
        self.read_limit = Some(Arc::new(factory));
        self
    }

    /// Install the session handler.
    pub fn with_handler(mut self, handler: impl Fn(Session) + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replace the admission limits. Call before [`serve`](Self::serve).
    pub fn with_limits(mut self, limits: AdmissionLimits) -> Self {
        self.connections = ActiveConnections::new(limits.max_connections);
        self.limits = limits;
        self
    }

    /// Apply the limits and throttling sections of a loaded config.
    pub fn apply_config(mut self, config: &ServerConfig) -> Self {
        self = self.with_limits(AdmissionLimits::from_config(config));
        if config.rate_limit.enabled {
            let rate = config.rate_limit.bytes_per_second;
            let burst = config.rate_limit.burst_bytes;
            self = self.with_read_limit(move || ReadLimiter::new(rate, burst));
        }
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Handle that makes [`serve`](Self::serve) return when triggered.
    /// In-flight per-connection tasks are not cancelled.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Live per-connection tasks right now.
    pub fn active_connections(&self) -> u64 {
        self.connections.live()
    }

    pub fn limits(&self) -> &AdmissionLimits {
        &self.limits
    }

    /// Run the accept loop until a fatal accept error or a shutdown
    /// trigger, then release the socket.
    ///
    /// Every accepted connection is handed to its own task immediately;
    /// acceptance never waits for a handshake to finish. Returns
    /// `Ok(())` on shutdown, `Err(ListenerError::Accept)` when the accept
    /// primitive itself fails.
    pub async fn serve(self) -> Result<(), ListenerError> {
        let Listener {
            inner,
            policy,
            upgrader,
            read_limit,
            handler,
            limits,
            connections,
            shutdown: _shutdown,
            mut shutdown_rx,
        } = self;

        if handler.is_none() {
            tracing::warn!("no session handler installed; established sessions will be dropped");
        }

        let context = ConnContext {
            policy,
            upgrader,
            read_limit,
            handler,
            handshake_timeout: limits.handshake_timeout,
            drain_budget: limits.max_global_requests,
        };

        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = connections.slot() => permit,
            };

            let (socket, peer) = tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = inner.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to accept connection; closing listener");
                        return Err(ListenerError::Accept(e));
                    }
                },
            };

            let guard = connections.admit(permit);
            metrics::record_connection_accepted();
            tracing::debug!(connection_id = %guard.id(), peer = %peer, "connection accepted");

            // Resume accepting immediately; the handshake runs over there.
            tokio::spawn(handle_connection(socket, peer, guard, context.clone()));
        }

        tracing::info!("shutdown signalled; listener draining");
        Ok(())
    }
}

/// Everything a per-connection task needs, detached from the listener.
struct ConnContext<U> {
    policy: Arc<HandshakePolicy>,
    upgrader: Arc<U>,
    read_limit: Option<LimiterFactory>,
    handler: Option<SessionHandler>,
    handshake_timeout: Option<Duration>,
    drain_budget: Option<u64>,
}

impl<U> Clone for ConnContext<U> {
    fn clone(&self) -> Self {
        Self {
            policy: Arc::clone(&self.policy),
            upgrader: Arc::clone(&self.upgrader),
            read_limit: self.read_limit.clone(),
            handler: self.handler.clone(),
            handshake_timeout: self.handshake_timeout,
            drain_budget: self.drain_budget,
        }
    }
}

async fn handle_connection<U: Upgrade>(
    socket: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    context: ConnContext<U>,
) {
    let id = guard.id();

    let stream: BoxedIo = match &context.read_limit {
        Some(factory) => Box::new(Throttled::new(socket, factory())),
        None => Box::new(socket),
    };

    let upgrade = context.upgrader.upgrade(stream, &context.policy);
    let upgraded = match context.handshake_timeout {
        Some(limit) => match tokio::time::timeout(limit, upgrade).await {
            Ok(outcome) => outcome,
            Err(_) => Err(UpgradeError::TimedOut),
        },
        None => upgrade.await,
    };

    let upgraded = match upgraded {
        Ok(upgraded) => upgraded,
        Err(e) => {
            metrics::record_upgrade_failure(e.kind());
            tracing::warn!(connection_id = %id, peer = %peer, error = %e, "handshake failed");
            return;
        }
    };

    // The drainer outlives this task; it is tied to the connection, and
    // it must never block the handler.
    drainer::spawn(
        upgraded.connection.handle(),
        upgraded.requests,
        context.drain_budget,
    );

    let session = match Session::new(upgraded.connection, upgraded.channels) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(connection_id = %id, peer = %peer, error = %e, "session setup failed");
            return;
        }
    };

    metrics::record_session_established();
    tracing::debug!(
        connection_id = %id,
        peer = %peer,
        username = %session.peer().username,
        "session established"
    );

    match &context.handler {
        Some(handler) => handler(session),
        None => {
            tracing::warn!(connection_id = %id, "session dropped: no handler installed");
        }
    }
}
