//! Metrics collection.
//!
//! # Responsibilities
//! - Define admission-pipeline metrics (accepts, upgrades, drains)
//! - Keep updates cheap enough for per-connection hot paths
//!
//! # Metrics
//! - `admission_connections_accepted_total` (counter)
//! - `admission_active_connections` (gauge): live per-connection tasks
//! - `admission_upgrade_failures_total` (counter): labelled by failure kind
//! - `admission_sessions_established_total` (counter)
//! - `admission_global_requests_discarded_total` (counter)

use metrics::{counter, gauge};

pub fn record_connection_accepted() {
    counter!("admission_connections_accepted_total").increment(1);
}

pub fn record_active_connections(live: u64) {
    gauge!("admission_active_connections").set(live as f64);
}

pub fn record_upgrade_failure(kind: &'static str) {
    counter!("admission_upgrade_failures_total", "kind" => kind).increment(1);
}

pub fn record_session_established() {
    counter!("admission_sessions_established_total").increment(1);
}

pub fn record_global_request_discarded() {
    counter!("admission_global_requests_discarded_total").increment(1);
}
