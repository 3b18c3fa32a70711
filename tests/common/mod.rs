//! Shared utilities for integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use replica_router::health::{ConnectionProbe, ProbeError};
use replica_router::ReplicaId;

/// Probe whose outcome per replica can be changed while a test runs.
#[derive(Default)]
pub struct ScriptedProbe {
    failing: Mutex<HashSet<ReplicaId>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, replica: &str) {
        self.failing.lock().unwrap().insert(replica.into());
    }

    pub fn heal(&self, replica: &str) {
        self.failing.lock().unwrap().remove(&ReplicaId::new(replica));
    }

    /// Make every probe take `delay` before answering.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConnectionProbe for ScriptedProbe {
    async fn test(&self, replica: &ReplicaId) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(replica) {
            return Err(ProbeError::Failed {
                replica: replica.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}
