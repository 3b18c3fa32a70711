//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject unknown, duplicate and overlapping identifiers
//! - Validate value ranges and addresses
//!
//! Returns every problem found, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("primary name must not be empty")]
    EmptyPrimary,

    #[error("replica #{index} has an empty name")]
    EmptyReplicaName { index: usize },

    #[error("replica {name} is configured more than once")]
    DuplicateReplica { name: String },

    #[error("replica {name} has the same name as the primary")]
    ReplicaIsPrimary { name: String },

    #[error("replica {name} has malformed address {address:?} (expected host:port)")]
    InvalidAddress { name: String, address: String },

    #[error("health.{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration before it is allowed into service.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.primary.trim().is_empty() {
        errors.push(ValidationError::EmptyPrimary);
    }

    let mut seen = HashSet::new();
    for (index, replica) in config.replicas.iter().enumerate() {
        if replica.name.trim().is_empty() {
            errors.push(ValidationError::EmptyReplicaName { index });
            continue;
        }
        if replica.name == config.primary {
            errors.push(ValidationError::ReplicaIsPrimary { name: replica.name.clone() });
        }
        if !seen.insert(replica.name.as_str()) {
            errors.push(ValidationError::DuplicateReplica { name: replica.name.clone() });
        }
        if !is_host_port(&replica.address) {
            errors.push(ValidationError::InvalidAddress {
                name: replica.name.clone(),
                address: replica.address.clone(),
            });
        }
    }

    if config.health.backoff_secs == 0 {
        errors.push(ValidationError::ZeroDuration { field: "backoff_secs" });
    }
    if config.health.probe_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration { field: "probe_timeout_ms" });
    }
    if config.health.refresh_interval_ms == 0 {
        errors.push(ValidationError::ZeroDuration { field: "refresh_interval_ms" });
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(observability.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accepts `host:port` and `[v6]:port`; DNS resolution is left to the probe.
fn is_host_port(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}
