//! Request-drainer behavior: discard semantics, termination, budget.

mod common;

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{global_request, start_server, MockUpgrader};
use portcullis::transport::drainer;
use portcullis::transport::upgrade::{ChannelRequest, PeerIdentity, SecureConnection};
use portcullis::AdmissionLimits;

fn connection() -> SecureConnection {
    SecureConnection::new(PeerIdentity {
        username: "guest".to_string(),
        client_version: "test-1.0".to_string(),
    })
}

#[tokio::test]
async fn discards_every_request_unanswered() {
    let conn = connection();
    let (tx, rx) = mpsc::unbounded_channel();
    let drainer = drainer::spawn(conn.handle(), rx, None);

    let mut replies = Vec::new();
    for i in 0..5 {
        let (request, reply) = global_request(&format!("keepalive-{i}"));
        tx.send(request).unwrap();
        replies.push(reply);
    }

    // Dropped reply senders are the observable proof of discard.
    for reply in replies {
        assert!(reply.await.is_err());
    }

    drop(tx);
    timeout(Duration::from_secs(1), drainer)
        .await
        .expect("drainer exits when the stream ends")
        .unwrap();
}

#[tokio::test]
async fn closing_connection_stops_drainer() {
    let conn = connection();
    let (tx, rx) = mpsc::unbounded_channel();
    let drainer = drainer::spawn(conn.handle(), rx, None);

    conn.close();
    timeout(Duration::from_secs(1), drainer)
        .await
        .expect("drainer observes the close promptly")
        .unwrap();

    drop(tx);
}

#[tokio::test]
async fn exhausted_budget_closes_connection() {
    let conn = connection();
    let (tx, rx) = mpsc::unbounded_channel();
    let drainer = drainer::spawn(conn.handle(), rx, Some(3));

    for i in 0..5 {
        let (request, _reply) = global_request(&format!("flood-{i}"));
        tx.send(request).unwrap();
    }

    timeout(Duration::from_secs(1), drainer)
        .await
        .expect("drainer gives up past the budget")
        .unwrap();
    assert!(conn.is_closed());
}

#[tokio::test]
async fn drains_behind_a_live_session() {
    let upgrader = MockUpgrader::new();
    let mut server = start_server(upgrader.clone(), AdmissionLimits::default()).await;

    let _client = TcpStream::connect(server.addr).await.unwrap();
    let mut session = timeout(Duration::from_secs(5), server.sessions.recv())
        .await
        .expect("session within deadline")
        .expect("handler channel open");

    let handles = upgrader.pop_handles();

    // Out-of-band requests vanish into the drainer while the session is
    // live and untouched.
    let (request, reply) = global_request("tcpip-forward");
    handles.globals.send(request).unwrap();
    assert!(reply.await.is_err());

    // Channel requests are not the drainer's to touch; they reach the
    // session intact.
    handles
        .channels
        .send(ChannelRequest {
            kind: "session".to_string(),
            payload: Vec::new(),
        })
        .unwrap();
    let channel = timeout(Duration::from_secs(1), session.next_channel())
        .await
        .expect("channel request within deadline")
        .expect("channel stream open");
    assert_eq!(channel.kind, "session");

    // Closing the session's connection ends its drainer's work.
    session.close();
    assert!(handles.conn.is_closed());
}
