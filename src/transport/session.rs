//! Session construction from an upgraded connection.
//!
//! Purely a composition step: the secure connection plus its
//! channel-request stream become the value handed to the application's
//! session handler. No independent state lives here.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::transport::upgrade::{
    ChannelRequest, ConnectionHandle, PeerIdentity, SecureConnection,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("secure connection already closed")]
    ConnectionClosed,
}

/// An authenticated session as seen by the application handler.
///
/// Owns the secure connection and the stream of channel-open requests.
/// Global requests never surface here; the drainer consumes them.
#[derive(Debug)]
pub struct Session {
    connection: SecureConnection,
    channels: mpsc::UnboundedReceiver<ChannelRequest>,
}

impl Session {
    /// Compose a session, failing if the connection is already unusable.
    pub fn new(
        connection: SecureConnection,
        channels: mpsc::UnboundedReceiver<ChannelRequest>,
    ) -> Result<Self, SessionError> {
        if connection.is_closed() {
            return Err(SessionError::ConnectionClosed);
        }
        Ok(Self {
            connection,
            channels,
        })
    }

    pub fn peer(&self) -> &PeerIdentity {
        self.connection.peer()
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.connection.handle()
    }

    /// Next request to open a logical sub-stream. `None` once the
    /// connection's protocol layer has gone away.
    pub async fn next_channel(&mut self) -> Option<ChannelRequest> {
        self.channels.recv().await
    }

    pub fn close(&self) {
        self.connection.close();
    }

    pub async fn closed(&self) {
        self.connection.closed().await;
    }
}
