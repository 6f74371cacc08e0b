//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use portcullis::transport::upgrade::{
    BoxedIo, ChannelRequest, ConnectionHandle, GlobalRequest, HandshakePolicy, PeerIdentity,
    SecureConnection, Upgrade, UpgradeError, Upgraded,
};
use portcullis::{AdmissionLimits, Listener, ListenerError, Session, Shutdown};

/// Senders and close-handle for one mock-upgraded connection, kept so
/// tests can drive the protocol side after the upgrade.
pub struct UpgradedHandles {
    pub conn: ConnectionHandle,
    pub globals: mpsc::UnboundedSender<GlobalRequest>,
    pub channels: mpsc::UnboundedSender<ChannelRequest>,
}

/// Scriptable stand-in for a secure-transport implementation.
///
/// Optionally gated on a zero-permit semaphore so tests control exactly
/// when each handshake completes, and switchable into rejecting mode.
pub struct MockUpgrader {
    gate: Option<Arc<Semaphore>>,
    reject: AtomicBool,
    started: AtomicUsize,
    completed: AtomicUsize,
    pub handles: Mutex<Vec<UpgradedHandles>>,
}

impl MockUpgrader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: None,
            reject: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Handshakes block until the gate receives a permit per connection.
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            reject: AtomicBool::new(false),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Handshakes that have begun (including ones still blocked).
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Handshakes that finished successfully.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn pop_handles(&self) -> UpgradedHandles {
        self.handles
            .lock()
            .unwrap()
            .pop()
            .expect("no upgraded connection recorded")
    }
}

#[async_trait]
impl Upgrade for MockUpgrader {
    async fn upgrade(
        &self,
        stream: BoxedIo,
        _policy: &HandshakePolicy,
    ) -> Result<Upgraded, UpgradeError> {
        // Keep the raw stream alive for the duration of the "handshake" so
        // the client side does not observe a premature close.
        let _stream = stream;

        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self.reject.load(Ordering::SeqCst) {
            return Err(UpgradeError::AuthRejected("guest".to_string()));
        }

        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (global_tx, global_rx) = mpsc::unbounded_channel();
        let connection = SecureConnection::new(PeerIdentity {
            username: "guest".to_string(),
            client_version: "mock-1.0".to_string(),
        });

        self.handles.lock().unwrap().push(UpgradedHandles {
            conn: connection.handle(),
            globals: global_tx,
            channels: channel_tx,
        });
        self.completed.fetch_add(1, Ordering::SeqCst);

        Ok(Upgraded {
            connection,
            channels: channel_rx,
            requests: global_rx,
        })
    }
}

/// A served listener plus the hooks tests poke at.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub serve: JoinHandle<Result<(), ListenerError>>,
    pub sessions: mpsc::UnboundedReceiver<Session>,
}

/// Bind on an ephemeral port, install a channel-backed handler, and spawn
/// `serve`.
pub async fn start_server(upgrader: Arc<MockUpgrader>, limits: AdmissionLimits) -> TestServer {
    let (session_tx, sessions) = mpsc::unbounded_channel();
    let listener = Listener::bind("127.0.0.1:0", Arc::new(HandshakePolicy::default()), upgrader)
        .await
        .expect("bind test listener")
        .with_limits(limits)
        .with_handler(move |session| {
            let _ = session_tx.send(session);
        });

    let addr = listener.local_addr().expect("listener local addr");
    let shutdown = listener.shutdown_handle();
    let serve = tokio::spawn(listener.serve());

    TestServer {
        addr,
        shutdown,
        serve,
        sessions,
    }
}

/// Poll `condition` until it holds or a 5 second deadline passes.
pub async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A global request paired with the receiver that observes its fate.
pub fn global_request(kind: &str) -> (GlobalRequest, tokio::sync::oneshot::Receiver<Vec<u8>>) {
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
    (
        GlobalRequest {
            kind: kind.to_string(),
            want_reply: true,
            payload: vec![0xde, 0xad],
            reply: Some(reply_tx),
        },
        reply_rx,
    )
}
