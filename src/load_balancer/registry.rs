//! Replica registry.
//!
//! # Responsibilities
//! - Own the configured replica set, in configuration order
//! - Track each replica's availability and reconnect deadline
//! - Answer the queries used to rebuild the rotation and the refresh deadline

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::load_balancer::replica::{ReplicaId, ReplicaState};

/// Errors raised while building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("replica {0} is configured more than once")]
    Duplicate(ReplicaId),

    #[error("replica {0} is also the primary")]
    PrimaryInPool(ReplicaId),

    #[error("replica name must not be empty")]
    EmptyName,
}

/// Point-in-time view of one replica, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaStatus {
    pub id: ReplicaId,
    pub available: bool,
    /// Milliseconds until the replica is eligible for re-admission.
    pub reconnect_in_ms: Option<u64>,
}

/// The set of configured replicas and their availability.
#[derive(Debug, Clone)]
pub struct ReplicaRegistry {
    entries: Vec<(ReplicaId, ReplicaState)>,
    index: HashMap<ReplicaId, usize>,
}

impl ReplicaRegistry {
    /// Build a registry with every replica available.
    pub fn new<I>(ids: I, primary: &ReplicaId) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = ReplicaId>,
    {
        let mut entries = Vec::new();
        let mut index = HashMap::new();

        for id in ids {
            if id.as_str().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if &id == primary {
                return Err(RegistryError::PrimaryInPool(id));
            }
            if index.contains_key(&id) {
                return Err(RegistryError::Duplicate(id));
            }
            index.insert(id.clone(), entries.len());
            entries.push((id, ReplicaState::Available));
        }

        Ok(Self { entries, index })
    }

    /// Number of registered replicas, available or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `id` is a registered replica.
    pub fn contains(&self, id: &ReplicaId) -> bool {
        self.index.contains_key(id)
    }

    /// Current state of `id`, `None` if unknown.
    pub fn state(&self, id: &ReplicaId) -> Option<ReplicaState> {
        self.index.get(id).map(|&i| self.entries[i].1)
    }

    /// True if `id` is registered and in rotation.
    pub fn is_available(&self, id: &ReplicaId) -> bool {
        self.state(id).is_some_and(|s| s.is_available())
    }

    /// Put a replica back into rotation.
    ///
    /// Returns true if the replica was unavailable before the call.
    pub fn mark_available(&mut self, id: &ReplicaId) -> bool {
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        let state = &mut self.entries[i].1;
        let changed = !state.is_available();
        *state = ReplicaState::Available;
        changed
    }

    /// Take a replica out of rotation until `reconnect_at`.
    ///
    /// An already unavailable replica only has its deadline updated. Returns
    /// true if the replica was available before the call.
    pub fn mark_unavailable(&mut self, id: &ReplicaId, reconnect_at: Instant) -> bool {
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        let state = &mut self.entries[i].1;
        let changed = state.is_available();
        *state = ReplicaState::Unavailable { reconnect_at };
        changed
    }

    /// Available replicas, in configuration order.
    pub fn available_ids(&self) -> Vec<ReplicaId> {
        self.entries
            .iter()
            .filter(|(_, state)| state.is_available())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Unavailable replicas with their reconnect deadlines, in configuration order.
    pub fn unavailable_deadlines(&self) -> Vec<(ReplicaId, Instant)> {
        self.entries
            .iter()
            .filter_map(|(id, state)| state.reconnect_at().map(|at| (id.clone(), at)))
            .collect()
    }

    /// Earliest reconnect deadline, or `None` when every replica is available.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .filter_map(|(_, state)| state.reconnect_at())
            .min()
    }

    /// Unavailable replicas whose deadline is at or before `now`.
    pub fn due_for_readmission(&self, now: Instant) -> Vec<ReplicaId> {
        self.entries
            .iter()
            .filter_map(|(id, state)| match state.reconnect_at() {
                Some(at) if at <= now => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Status of every replica, with remaining backoff measured from `now`.
    pub fn snapshot(&self, now: Instant) -> Vec<ReplicaStatus> {
        self.entries
            .iter()
            .map(|(id, state)| ReplicaStatus {
                id: id.clone(),
                available: state.is_available(),
                reconnect_in_ms: state
                    .reconnect_at()
                    .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            })
            .collect()
    }
}
