//! Background re-admission.
//!
//! Reads already refresh on demand; this task only keeps the rotation current
//! while read traffic is idle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::health::monitor::HealthMonitor;
use crate::health::probe::ConnectionProbe;

/// Periodically re-admits replicas whose backoff has elapsed.
pub struct RefreshTask<P> {
    monitor: Arc<HealthMonitor<P>>,
    interval: Duration,
}

impl<P: ConnectionProbe> RefreshTask<P> {
    /// Check `monitor` every `interval`.
    pub fn new(monitor: Arc<HealthMonitor<P>>, interval: Duration) -> Self {
        Self { monitor, interval }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Replica refresher starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.monitor.maybe_refresh_at(Instant::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Replica refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::monitor::HealthSettings;
    use crate::health::probe::ProbeError;
    use crate::lifecycle::Shutdown;
    use crate::load_balancer::{ReplicaId, ReplicaRegistry};

    struct AlwaysUp;

    impl ConnectionProbe for AlwaysUp {
        async fn test(&self, _replica: &ReplicaId) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_refresher_readmits_and_stops() {
        let primary = ReplicaId::new("default");
        let registry = ReplicaRegistry::new(vec![ReplicaId::new("r1")], &primary).unwrap();
        let settings = HealthSettings {
            backoff: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(50),
        };
        let monitor = Arc::new(HealthMonitor::new(primary, registry, AlwaysUp, settings));
        monitor.disable(&"r1".into());
        assert!(!monitor.is_available(&"r1".into()));

        let mut shutdown = Shutdown::new();
        shutdown.spawn_refresher(RefreshTask::new(monitor.clone(), Duration::from_millis(10)));

        time::sleep(Duration::from_millis(150)).await;
        assert!(monitor.is_available(&"r1".into()));

        assert_eq!(shutdown.drain(Duration::from_secs(1)).await, 1);
    }
}
