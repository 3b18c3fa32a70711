//! Primary/replica router.
//!
//! Reads go to a probed replica in round-robin order unless the calling
//! context is pinned; writes and schema migrations always go to the primary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RouterConfig;
use crate::health::monitor::{HealthMonitor, HealthSettings};
use crate::health::probe::ConnectionProbe;
use crate::load_balancer::{RegistryError, ReplicaId, ReplicaRegistry, ReplicaStatus};
use crate::observability::metrics;
use crate::routing::pinning::{NeverPinned, PinSource, PinningGate};

/// Snapshot of the router for status output.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub primary: ReplicaId,
    pub backoff_secs: u64,
    /// Milliseconds until the next re-admission check can succeed.
    pub next_refresh_in_ms: Option<u64>,
    pub replicas: Vec<ReplicaStatus>,
}

/// Builder for [`ReplicaRouter`].
#[derive(Debug, Clone)]
pub struct RouterBuilder {
    primary: ReplicaId,
    replicas: Vec<ReplicaId>,
    settings: HealthSettings,
}

impl RouterBuilder {
    /// Start a builder with no replicas and default health settings.
    pub fn new(primary: impl Into<ReplicaId>) -> Self {
        Self {
            primary: primary.into(),
            replicas: Vec::new(),
            settings: HealthSettings::default(),
        }
    }

    /// Add one replica to the pool.
    pub fn replica(mut self, id: impl Into<ReplicaId>) -> Self {
        self.replicas.push(id.into());
        self
    }

    /// Add several replicas, keeping their order.
    pub fn replicas<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ReplicaId>,
    {
        self.replicas.extend(ids.into_iter().map(Into::into));
        self
    }

    /// How long a failed replica stays out of rotation.
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.settings.backoff = backoff;
        self
    }

    /// Upper bound on a single connection check.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.settings.probe_timeout = timeout;
        self
    }

    /// Replace backoff and timeout together.
    pub fn settings(mut self, settings: HealthSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate the pool and assemble the router.
    pub fn build<P, S>(self, probe: P, pin_source: S) -> Result<ReplicaRouter<P, S>, RegistryError>
    where
        P: ConnectionProbe,
    {
        let registry = ReplicaRegistry::new(self.replicas, &self.primary)?;
        tracing::info!(
            primary = %self.primary,
            replicas = registry.len(),
            backoff_secs = self.settings.backoff.as_secs(),
            "Replica router initialized"
        );
        let monitor = HealthMonitor::new(self.primary, registry, probe, self.settings);
        Ok(ReplicaRouter::new(Arc::new(monitor), pin_source))
    }
}

/// Routes reads across healthy replicas and everything else to the primary.
pub struct ReplicaRouter<P, S = NeverPinned> {
    monitor: Arc<HealthMonitor<P>>,
    gate: PinningGate<S>,
}

impl ReplicaRouter<(), NeverPinned> {
    /// Shorthand for [`RouterBuilder::new`].
    pub fn builder(primary: impl Into<ReplicaId>) -> RouterBuilder {
        RouterBuilder::new(primary)
    }
}

impl<P: ConnectionProbe, S> ReplicaRouter<P, S> {
    /// Wrap an existing monitor, e.g. one shared with a refresher.
    pub fn new(monitor: Arc<HealthMonitor<P>>, pin_source: S) -> Self {
        Self {
            monitor,
            gate: PinningGate::new(pin_source),
        }
    }

    /// Build a router from validated configuration.
    pub fn from_config(config: &RouterConfig, probe: P, pin_source: S) -> Result<Self, RegistryError> {
        RouterBuilder::new(config.primary.as_str())
            .replicas(config.replicas.iter().map(|r| r.name.as_str()))
            .settings(HealthSettings::from(&config.health))
            .build(probe, pin_source)
    }

    /// Connection used for writes and degraded reads.
    pub fn primary(&self) -> &ReplicaId {
        self.monitor.primary()
    }

    /// Health monitor backing read selection.
    pub fn monitor(&self) -> &Arc<HealthMonitor<P>> {
        &self.monitor
    }

    /// Pin source consulted on every read.
    pub fn pin_source(&self) -> &S {
        self.gate.source()
    }

    /// Connection for a read issued by `ctx` at `now`.
    ///
    /// Pinned contexts always get the primary. Never fails.
    pub async fn route_read_at<C: ?Sized>(&self, ctx: &C, now: Instant) -> ReplicaId
    where
        S: PinSource<C>,
    {
        if self.gate.is_pinned(ctx) {
            tracing::debug!(target_db = %self.primary(), "Read pinned to primary");
            metrics::record_read(self.primary(), "pinned");
            return self.primary().clone();
        }

        let selection = self.monitor.select_at(now).await;
        let reason = selection.outcome.reason();
        tracing::debug!(target_db = %selection.target, reason, "Read routed");
        metrics::record_read(&selection.target, reason);
        selection.target
    }

    /// Route a read at the current time.
    pub async fn route_read<C: ?Sized>(&self, ctx: &C) -> ReplicaId
    where
        S: PinSource<C>,
    {
        self.route_read_at(ctx, Instant::now()).await
    }

    /// Connection for a write. Always the primary.
    pub fn route_write(&self) -> ReplicaId {
        metrics::record_write();
        self.primary().clone()
    }

    /// Schema changes run on the primary only.
    pub fn allow_migration(&self, db: &ReplicaId) -> bool {
        db == self.primary()
    }

    /// Relations between objects are allowed regardless of where they were read.
    pub fn allow_relation(&self, _a: &ReplicaId, _b: &ReplicaId) -> bool {
        true
    }

    /// Take a replica out of rotation, e.g. after an error outside the probe.
    pub fn disable(&self, replica: &ReplicaId) {
        self.monitor.disable(replica);
    }

    /// Re-admit replicas whose backoff has elapsed. Returns the re-admitted ones.
    pub fn refresh(&self) -> Vec<ReplicaId> {
        self.monitor.maybe_refresh()
    }

    /// Router and per-replica status relative to `now`.
    pub fn status_at(&self, now: Instant) -> RouterStatus {
        RouterStatus {
            primary: self.primary().clone(),
            backoff_secs: self.monitor.settings().backoff.as_secs(),
            next_refresh_in_ms: self
                .monitor
                .next_refresh_deadline()
                .map(|at| at.saturating_duration_since(now).as_millis() as u64),
            replicas: self.monitor.snapshot_at(now),
        }
    }

    /// Status at the current time.
    pub fn status(&self) -> RouterStatus {
        self.status_at(Instant::now())
    }
}
