//! Metrics collection and exposition.
//!
//! # Metrics
//! - `replica_router_reads_total` (counter): routed reads by target and reason
//! - `replica_router_writes_total` (counter): routed writes
//! - `replica_router_probe_failures_total` (counter): failed probes by replica and kind
//! - `replica_router_replica_available` (gauge): 1=in rotation, 0=backing off
//! - `replica_router_available_replicas` (gauge): size of the rotation
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::load_balancer::ReplicaId;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_read(target: &ReplicaId, reason: &'static str) {
    counter!("replica_router_reads_total", "target" => target.to_string(), "reason" => reason).increment(1);
}

pub fn record_write() {
    counter!("replica_router_writes_total").increment(1);
}

pub fn record_probe_failure(replica: &ReplicaId, kind: &'static str) {
    counter!("replica_router_probe_failures_total", "replica" => replica.to_string(), "kind" => kind).increment(1);
}

pub fn record_replica_available(replica: &ReplicaId, available: bool) {
    gauge!("replica_router_replica_available", "replica" => replica.to_string())
        .set(if available { 1.0 } else { 0.0 });
}

pub fn record_available_replicas(count: usize) {
    gauge!("replica_router_available_replicas").set(count as f64);
}
