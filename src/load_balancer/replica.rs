//! Replica identity and per-replica state.
//!
//! # Responsibilities
//! - Name a replica connection (cheap to clone, hashable)
//! - Track availability and the reconnect deadline of one replica

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Serialize, Serializer};

/// Opaque identifier naming a database connection.
///
/// Cloning only bumps a reference count, so ids can be handed out on every
/// routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReplicaId(Arc<str>);

impl ReplicaId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ReplicaId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl AsRef<str> for ReplicaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ReplicaId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ReplicaId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for ReplicaId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Availability of a single replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicaState {
    /// In rotation.
    #[default]
    Available,
    /// Out of rotation until `reconnect_at` has passed and a refresh runs.
    Unavailable { reconnect_at: Instant },
}

impl ReplicaState {
    pub fn is_available(&self) -> bool {
        matches!(self, ReplicaState::Available)
    }

    /// Reconnect deadline, meaningful only while unavailable.
    pub fn reconnect_at(&self) -> Option<Instant> {
        match self {
            ReplicaState::Available => None,
            ReplicaState::Unavailable { reconnect_at } => Some(*reconnect_at),
        }
    }
}
