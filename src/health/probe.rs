//! Connectivity probes.
//!
//! # Responsibilities
//! - Define the probe seam used before a replica is handed out
//! - Provide a TCP connect probe for configured replica addresses

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::ReplicaConfig;
use crate::load_balancer::ReplicaId;

/// Why a replica failed its connectivity check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe of {replica} failed: {reason}")]
    Failed { replica: ReplicaId, reason: String },

    #[error("probe of {replica} timed out after {after:?}")]
    Timeout { replica: ReplicaId, after: Duration },

    #[error("no connection configured for {0}")]
    UnknownReplica(ReplicaId),
}

impl ProbeError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Failed { .. } => "failed",
            ProbeError::Timeout { .. } => "timeout",
            ProbeError::UnknownReplica(_) => "unknown",
        }
    }
}

/// A liveness check against one replica connection.
///
/// Callers bound every probe with a timeout, so implementations may block on
/// I/O for as long as the underlying transport does.
pub trait ConnectionProbe: Send + Sync {
    fn test(&self, replica: &ReplicaId) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

impl<P: ConnectionProbe> ConnectionProbe for Arc<P> {
    fn test(&self, replica: &ReplicaId) -> impl Future<Output = Result<(), ProbeError>> + Send {
        (**self).test(replica)
    }
}

/// Probe that opens (and immediately drops) a TCP connection to the replica.
#[derive(Debug, Clone, Default)]
pub struct TcpProbe {
    addresses: HashMap<ReplicaId, String>,
}

impl TcpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address book built from the configured replicas.
    pub fn from_config(replicas: &[ReplicaConfig]) -> Self {
        let mut probe = Self::new();
        for replica in replicas {
            probe.insert(ReplicaId::new(&replica.name), replica.address.clone());
        }
        probe
    }

    pub fn insert(&mut self, replica: ReplicaId, address: impl Into<String>) {
        self.addresses.insert(replica, address.into());
    }

    pub fn address(&self, replica: &ReplicaId) -> Option<&str> {
        self.addresses.get(replica).map(String::as_str)
    }
}

impl ConnectionProbe for TcpProbe {
    async fn test(&self, replica: &ReplicaId) -> Result<(), ProbeError> {
        let address = self
            .address(replica)
            .ok_or_else(|| ProbeError::UnknownReplica(replica.clone()))?;

        TcpStream::connect(address)
            .await
            .map(drop)
            .map_err(|e| ProbeError::Failed {
                replica: replica.clone(),
                reason: e.to_string(),
            })
    }
}
