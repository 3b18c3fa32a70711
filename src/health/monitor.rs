//! Replica health state machine.
//!
//! # States
//! - Available: replica is in rotation
//! - Unavailable: replica failed a probe and waits out its backoff
//!
//! # State Transitions
//! ```text
//! Available → Unavailable: probe fails or times out (reconnect_at = now + backoff)
//! Unavailable → Available: a refresh runs after reconnect_at has passed
//! ```
//!
//! Re-admission is time based only. Every use of a replica is still gated by a
//! live probe, so a replica that is still broken is disabled again on first use.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::time;

use crate::config::HealthConfig;
use crate::health::probe::{ConnectionProbe, ProbeError};
use crate::load_balancer::{ReplicaId, ReplicaRegistry, ReplicaStatus, SelectionCycle};
use crate::observability::metrics;

/// Default delay before a disabled replica may rejoin the rotation.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Default upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Timing knobs for the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSettings {
    pub backoff: Duration,
    pub probe_timeout: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_BACKOFF,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl From<&HealthConfig> for HealthSettings {
    fn from(config: &HealthConfig) -> Self {
        Self {
            backoff: Duration::from_secs(config.backoff_secs),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }
}

/// How a read target was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// A replica passed its probe.
    Replica,
    /// No replica was in rotation.
    NoneAvailable,
    /// The drawn replica failed its probe and was disabled.
    ProbeFailed(ProbeError),
    /// The replica passed its check but another caller disabled it meanwhile.
    DisabledMidCheck,
}

impl SelectionOutcome {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SelectionOutcome::Replica => "replica",
            SelectionOutcome::NoneAvailable => "none_available",
            SelectionOutcome::ProbeFailed(_) => "probe_failed",
            SelectionOutcome::DisabledMidCheck => "disabled_mid_check",
        }
    }
}

/// A read target together with the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub target: ReplicaId,
    pub outcome: SelectionOutcome,
}

#[derive(Debug)]
struct MonitorState {
    registry: ReplicaRegistry,
    /// Earliest reconnect deadline; `None` while every replica is available.
    next_refresh: Option<Instant>,
}

/// Tracks replica availability and hands out probed read targets.
#[derive(Debug)]
pub struct HealthMonitor<P> {
    state: Mutex<MonitorState>,
    cycle: SelectionCycle,
    probe: P,
    settings: HealthSettings,
    replica_count: usize,
}

impl<P: ConnectionProbe> HealthMonitor<P> {
    /// Create a monitor with every registered replica in rotation.
    pub fn new(primary: ReplicaId, registry: ReplicaRegistry, probe: P, settings: HealthSettings) -> Self {
        let available = registry.available_ids();
        metrics::record_available_replicas(available.len());
        for id in &available {
            metrics::record_replica_available(id, true);
        }

        let replica_count = registry.len();
        let next_refresh = registry.next_deadline();
        Self {
            state: Mutex::new(MonitorState {
                registry,
                next_refresh,
            }),
            cycle: SelectionCycle::new(primary, available),
            probe,
            settings,
            replica_count,
        }
    }

    /// The fallback target for every degraded read.
    pub fn primary(&self) -> &ReplicaId {
        self.cycle.primary()
    }

    /// Backoff and probe timeout in effect.
    pub fn settings(&self) -> HealthSettings {
        self.settings
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        // State is rewritten wholesale on each transition, so a poisoned lock
        // still guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take `replica` out of rotation for one backoff period starting at `now`.
    pub fn disable_at(&self, replica: &ReplicaId, now: Instant) {
        let reconnect_at = now + self.settings.backoff;
        let available = {
            let mut state = self.lock();
            if !state.registry.contains(replica) {
                tracing::debug!(replica = %replica, "Ignoring disable for unknown replica");
                return;
            }
            if state.registry.mark_unavailable(replica, reconnect_at) {
                self.cycle.rebuild(state.registry.available_ids());
            }
            state.next_refresh = state.registry.next_deadline();
            self.cycle.members().len()
        };

        tracing::warn!(
            replica = %replica,
            backoff_secs = self.settings.backoff.as_secs(),
            available,
            "Replica disabled"
        );
        metrics::record_replica_available(replica, false);
        metrics::record_available_replicas(available);
    }

    /// Disable `replica` starting now.
    pub fn disable(&self, replica: &ReplicaId) {
        self.disable_at(replica, Instant::now());
    }

    /// Re-admit every replica whose backoff has elapsed by `now`.
    ///
    /// Does nothing until `now` is past the earliest reconnect deadline.
    /// Returns the re-admitted replicas.
    pub fn maybe_refresh_at(&self, now: Instant) -> Vec<ReplicaId> {
        let (readmitted, available) = {
            let mut state = self.lock();
            match state.next_refresh {
                Some(deadline) if now > deadline => {}
                _ => return Vec::new(),
            }

            let due = state.registry.due_for_readmission(now);
            for id in &due {
                state.registry.mark_available(id);
            }
            self.cycle.rebuild(state.registry.available_ids());
            state.next_refresh = state.registry.next_deadline();
            (due, self.cycle.members().len())
        };

        for id in &readmitted {
            tracing::info!(replica = %id, "Replica re-admitted to rotation");
            metrics::record_replica_available(id, true);
        }
        metrics::record_available_replicas(available);
        readmitted
    }

    /// Re-admit replicas whose backoff has elapsed by now.
    pub fn maybe_refresh(&self) -> Vec<ReplicaId> {
        self.maybe_refresh_at(Instant::now())
    }

    /// Draw the next replica that is still available.
    ///
    /// A concurrent disable may land between the rotation read and this
    /// check; such candidates are skipped. Bounded by the pool size.
    fn draw(&self) -> Option<ReplicaId> {
        for _ in 0..self.replica_count.max(1) {
            let candidate = self.cycle.next();
            if &candidate == self.primary() {
                return None;
            }
            if self.lock().registry.is_available(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Pick a read target at `now`, probing the candidate first.
    ///
    /// Never fails: any probe failure or timeout falls back to the primary and
    /// disables the candidate. The probe runs with no lock held, so availability
    /// is checked again once it returns.
    pub async fn select_at(&self, now: Instant) -> Selection {
        self.maybe_refresh_at(now);

        let Some(candidate) = self.draw() else {
            return Selection {
                target: self.primary().clone(),
                outcome: SelectionOutcome::NoneAvailable,
            };
        };

        let result = match time::timeout(self.settings.probe_timeout, self.probe.test(&candidate)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                replica: candidate.clone(),
                after: self.settings.probe_timeout,
            }),
        };

        match result {
            Ok(()) if self.is_available(&candidate) => Selection {
                target: candidate,
                outcome: SelectionOutcome::Replica,
            },
            Ok(()) => {
                tracing::debug!(replica = %candidate, "Replica disabled while probing, falling back to primary");
                Selection {
                    target: self.primary().clone(),
                    outcome: SelectionOutcome::DisabledMidCheck,
                }
            }
            Err(e) => {
                tracing::warn!(replica = %candidate, error = %e, "Replica probe failed, falling back to primary");
                metrics::record_probe_failure(&candidate, e.kind());
                self.disable_at(&candidate, now);
                Selection {
                    target: self.primary().clone(),
                    outcome: SelectionOutcome::ProbeFailed(e),
                }
            }
        }
    }

    /// Read target at `now`; the primary whenever no replica is usable.
    pub async fn get_replica_at(&self, now: Instant) -> ReplicaId {
        self.select_at(now).await.target
    }

    /// Read target at the current time.
    pub async fn get_replica(&self) -> ReplicaId {
        self.get_replica_at(Instant::now()).await
    }

    /// Earliest reconnect deadline, `None` while every replica is available.
    pub fn next_refresh_deadline(&self) -> Option<Instant> {
        self.lock().next_refresh
    }

    /// True if `replica` is currently in rotation.
    pub fn is_available(&self, replica: &ReplicaId) -> bool {
        self.lock().registry.is_available(replica)
    }

    /// Per-replica status relative to `now`.
    pub fn snapshot_at(&self, now: Instant) -> Vec<ReplicaStatus> {
        self.lock().registry.snapshot(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Probe whose failing set can be changed mid-test.
    #[derive(Default)]
    struct ScriptedProbe {
        failing: Mutex<HashSet<ReplicaId>>,
        hanging: Mutex<HashSet<ReplicaId>>,
    }

    impl ScriptedProbe {
        fn fail(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.into());
        }

        fn heal(&self, id: &str) {
            self.failing.lock().unwrap().remove(&ReplicaId::new(id));
        }

        fn hang(&self, id: &str) {
            self.hanging.lock().unwrap().insert(id.into());
        }
    }

    impl ConnectionProbe for ScriptedProbe {
        async fn test(&self, replica: &ReplicaId) -> Result<(), ProbeError> {
            let hangs = self.hanging.lock().unwrap().contains(replica);
            if hangs {
                std::future::pending::<()>().await;
            }
            if self.failing.lock().unwrap().contains(replica) {
                return Err(ProbeError::Failed {
                    replica: replica.clone(),
                    reason: "scripted".into(),
                });
            }
            Ok(())
        }
    }

    fn monitor(names: &[&str]) -> (HealthMonitor<Arc<ScriptedProbe>>, Arc<ScriptedProbe>) {
        let primary = ReplicaId::new("default");
        let registry = ReplicaRegistry::new(names.iter().map(|n| ReplicaId::new(n)), &primary).unwrap();
        let probe = Arc::new(ScriptedProbe::default());
        let settings = HealthSettings {
            backoff: Duration::from_secs(60),
            probe_timeout: Duration::from_millis(50),
        };
        (HealthMonitor::new(primary, registry, probe.clone(), settings), probe)
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let (monitor, _) = monitor(&["r1", "r2", "r3"]);
        let now = Instant::now();
        let mut counts: HashMap<ReplicaId, usize> = HashMap::new();

        for _ in 0..300 {
            *counts.entry(monitor.get_replica_at(now).await).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert!((99..=101).contains(count), "unfair count {}", count);
        }
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_and_disables() {
        let (monitor, probe) = monitor(&["r1", "r2"]);
        let t0 = Instant::now();
        probe.fail("r1");

        let selection = monitor.select_at(t0).await;
        assert_eq!(selection.target, "default");
        assert!(matches!(selection.outcome, SelectionOutcome::ProbeFailed(_)));
        assert!(!monitor.is_available(&"r1".into()));
        assert_eq!(monitor.next_refresh_deadline(), Some(t0 + secs(60)));
    }

    #[tokio::test]
    async fn test_scenario_disable_then_readmit() {
        let (monitor, probe) = monitor(&["r1", "r2"]);
        let t0 = Instant::now();
        probe.fail("r1");

        assert_eq!(monitor.get_replica_at(t0).await, "default");

        // Inside the backoff window only r2 is handed out.
        for offset in [10, 30, 59, 60] {
            assert_eq!(monitor.get_replica_at(t0 + secs(offset)).await, "r2");
        }

        probe.heal("r1");
        let mut seen = HashSet::new();
        for _ in 0..4 {
            seen.insert(monitor.get_replica_at(t0 + secs(61)).await);
        }
        assert!(seen.contains(&ReplicaId::new("r1")));
        assert!(seen.contains(&ReplicaId::new("r2")));
        assert_eq!(monitor.next_refresh_deadline(), None);
    }

    #[tokio::test]
    async fn test_total_outage_returns_primary() {
        let (monitor, probe) = monitor(&["r1", "r2"]);
        let t0 = Instant::now();
        probe.fail("r1");
        probe.fail("r2");

        for i in 0..100 {
            assert_eq!(monitor.get_replica_at(t0 + Duration::from_millis(i)).await, "default");
        }
        assert!(monitor.cycle.is_empty());
    }

    #[tokio::test]
    async fn test_no_replicas_configured() {
        let (monitor, _) = monitor(&[]);
        for _ in 0..10 {
            let selection = monitor.select_at(Instant::now()).await;
            assert_eq!(selection.target, "default");
            assert_eq!(selection.outcome, SelectionOutcome::NoneAvailable);
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_treated_as_failure() {
        let (monitor, probe) = monitor(&["r1", "r2"]);
        probe.hang("r1");

        let selection = monitor.select_at(Instant::now()).await;
        assert_eq!(selection.target, "default");
        match selection.outcome {
            SelectionOutcome::ProbeFailed(e) => assert_eq!(e.kind(), "timeout"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(!monitor.is_available(&"r1".into()));
    }

    /// First check parks until released; every later check fails.
    #[derive(Default)]
    struct GatedCheck {
        calls: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    impl ConnectionProbe for GatedCheck {
        async fn test(&self, replica: &ReplicaId) -> Result<(), ProbeError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.release.notified().await;
                return Ok(());
            }
            Err(ProbeError::Failed {
                replica: replica.clone(),
                reason: "refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_replica_disabled_mid_check_is_not_returned() {
        let primary = ReplicaId::new("default");
        let registry = ReplicaRegistry::new([ReplicaId::new("r1")], &primary).unwrap();
        let gate = Arc::new(GatedCheck::default());
        let settings = HealthSettings {
            backoff: secs(60),
            probe_timeout: secs(30),
        };
        let monitor = Arc::new(HealthMonitor::new(primary, registry, gate.clone(), settings));
        let t0 = Instant::now();

        let slow = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.select_at(t0).await })
        };
        gate.entered.notified().await;

        // A second caller sees r1 fail and disables it while the first is parked.
        let fast = monitor.select_at(t0).await;
        assert_eq!(fast.target, "default");
        assert!(matches!(fast.outcome, SelectionOutcome::ProbeFailed(_)));
        assert!(!monitor.is_available(&"r1".into()));

        gate.release.notify_one();
        let slow = slow.await.unwrap();
        assert_eq!(slow.target, "default");
        assert_eq!(slow.outcome, SelectionOutcome::DisabledMidCheck);
        assert_eq!(slow.outcome.reason(), "disabled_mid_check");
    }

    #[test]
    fn test_deadline_tracks_minimum() {
        let (monitor, _) = monitor(&["r1", "r2", "r3"]);
        let t0 = Instant::now();

        monitor.disable_at(&"r2".into(), t0 + secs(5));
        monitor.disable_at(&"r1".into(), t0);
        assert_eq!(monitor.next_refresh_deadline(), Some(t0 + secs(60)));

        // Re-disabling pushes r1 later, so r2 becomes the earliest.
        monitor.disable_at(&"r1".into(), t0 + secs(20));
        assert_eq!(monitor.next_refresh_deadline(), Some(t0 + secs(65)));

        // At exactly the deadline nothing happens yet.
        assert!(monitor.maybe_refresh_at(t0 + secs(65)).is_empty());

        let readmitted = monitor.maybe_refresh_at(t0 + secs(66));
        assert_eq!(readmitted, vec![ReplicaId::new("r2")]);
        assert_eq!(monitor.next_refresh_deadline(), Some(t0 + secs(80)));

        assert_eq!(monitor.maybe_refresh_at(t0 + secs(81)), vec![ReplicaId::new("r1")]);
        assert_eq!(monitor.next_refresh_deadline(), None);
    }

    #[test]
    fn test_disable_unknown_replica_is_ignored() {
        let (monitor, _) = monitor(&["r1"]);
        monitor.disable_at(&"default".into(), Instant::now());
        assert_eq!(monitor.next_refresh_deadline(), None);
        assert_eq!(*monitor.cycle.members(), vec![ReplicaId::new("r1")]);
    }

    #[test]
    fn test_snapshot() {
        let (monitor, _) = monitor(&["r1", "r2"]);
        let t0 = Instant::now();
        monitor.disable_at(&"r1".into(), t0);

        let snap = monitor.snapshot_at(t0 + secs(20));
        assert!(!snap[0].available);
        assert_eq!(snap[0].reconnect_in_ms, Some(40_000));
        assert!(snap[1].available);
    }
}
