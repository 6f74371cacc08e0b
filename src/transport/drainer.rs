//! Background draining of out-of-band requests.
//!
//! Multiplexed transports require someone to consume global requests
//! promptly; an unread queue can stall unrelated traffic on the same
//! connection. Each upgraded connection gets one drainer task that
//! discards every global request for the connection's lifetime.
//!
//! Discarding means dropping: the request's reply sender goes down with
//! it, which the protocol layer treats as an automatic refusal.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::transport::upgrade::{ConnectionHandle, GlobalRequest};

/// Spawn the drainer for one upgraded connection.
///
/// Runs until the request stream ends, the connection closes, or the
/// discard budget (when set) is exhausted. Exhausting the budget closes
/// the connection: a peer that floods out-of-band requests after
/// authenticating no longer gets free discard work.
pub fn spawn(
    conn: ConnectionHandle,
    mut requests: mpsc::UnboundedReceiver<GlobalRequest>,
    budget: Option<u64>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut discarded: u64 = 0;
        loop {
            tokio::select! {
                _ = conn.closed() => break,
                request = requests.recv() => {
                    let Some(request) = request else { break };
                    discarded += 1;
                    metrics::record_global_request_discarded();
                    tracing::trace!(kind = %request.kind, "discarded out-of-band request");
                    drop(request);
                    if budget.is_some_and(|limit| discarded > limit) {
                        tracing::warn!(
                            discarded,
                            "out-of-band request budget exhausted; closing connection"
                        );
                        conn.close();
                        break;
                    }
                }
            }
        }
        tracing::debug!(discarded, "request drainer finished");
    })
}
