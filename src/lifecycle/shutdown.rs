//! Stopping the router's background tasks.
//!
//! The router itself holds no resources that need closing. What does need
//! stopping is the refresher loop, so `Shutdown` both spawns it and drains it.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::health::{ConnectionProbe, RefreshTask};

/// Owns the refresher tasks and the signal that ends them.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx, tasks: Vec::new() }
    }

    /// Spawn `task` on the runtime, wired to this signal.
    pub fn spawn_refresher<P>(&mut self, task: RefreshTask<P>)
    where
        P: ConnectionProbe + 'static,
    {
        let handle = tokio::spawn(task.run(self.tx.subscribe()));
        self.tasks.push(("refresher", handle));
    }

    /// Tasks spawned and not yet drained.
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every task and wait up to `grace` for each to exit.
    ///
    /// Tasks still running after the grace period are aborted. Returns the
    /// number of tasks that exited on their own.
    pub async fn drain(self, grace: Duration) -> usize {
        // No receivers left just means every task already returned.
        let _ = self.tx.send(());

        let mut clean = 0;
        for (name, mut handle) in self.tasks {
            match time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => clean += 1,
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
                Err(_) => {
                    tracing::warn!(task = name, grace_ms = grace.as_millis() as u64, "Background task did not stop, aborting");
                    handle.abort();
                }
            }
        }
        clean
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
