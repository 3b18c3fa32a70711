//! Round-robin selection over the available replicas.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::replica::ReplicaId;

/// Circular cursor over the currently available replicas.
///
/// The member list is swapped atomically on rebuild, so `next` never observes
/// a half-written list. When the list is empty every call yields the primary.
#[derive(Debug)]
pub struct SelectionCycle {
    members: ArcSwap<Vec<ReplicaId>>,
    cursor: AtomicUsize,
    primary: ReplicaId,
}

impl SelectionCycle {
    pub fn new(primary: ReplicaId, members: Vec<ReplicaId>) -> Self {
        Self {
            members: ArcSwap::from_pointee(members),
            cursor: AtomicUsize::new(0),
            primary,
        }
    }

    /// Replace the rotation and restart it from the first member.
    pub fn rebuild(&self, members: Vec<ReplicaId>) {
        self.members.store(Arc::new(members));
        self.cursor.store(0, Ordering::Relaxed);
    }

    /// Next replica in rotation, or the primary when nothing is available.
    pub fn next(&self) -> ReplicaId {
        let members = self.members.load();
        if members.is_empty() {
            return self.primary.clone();
        }

        // Racing callers may see the same slot twice; the modulo keeps every
        // index in bounds even if a rebuild shrank the list meanwhile.
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        members[slot % members.len()].clone()
    }

    /// Current rotation.
    pub fn members(&self) -> Arc<Vec<ReplicaId>> {
        self.members.load_full()
    }

    pub fn is_empty(&self) -> bool {
        self.members.load().is_empty()
    }

    pub fn primary(&self) -> &ReplicaId {
        &self.primary
    }
}
