//! Replica router command line.
//!
//! Loads a router configuration, probes replicas over TCP and reports where
//! reads would be routed.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time;

use replica_router::config::{load_config, RouterConfig};
use replica_router::health::{RefreshTask, TcpProbe};
use replica_router::lifecycle::{signals, Shutdown};
use replica_router::observability::{logging, metrics};
use replica_router::routing::{PinStore, ReplicaRouter};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "replica-router")]
#[command(about = "Primary/replica read routing with probe-based failover", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "replica-router.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the initial router state
    Check,
    /// Route a batch of reads and print where they went
    Route {
        /// Number of reads to route.
        #[arg(short, long, default_value_t = 10)]
        reads: usize,

        /// Pin this client key to the primary before routing.
        #[arg(long)]
        pin: Option<String>,
    },
    /// Route a read periodically until interrupted
    Monitor {
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

type Router = ReplicaRouter<TcpProbe, PinStore>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {} ({})", e, cli.config.display());
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        config = %cli.config.display(),
        primary = %config.primary,
        replicas = config.replicas.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?);
    }

    let pins = PinStore::new(Duration::from_secs(config.pinning.window_secs));
    let probe = TcpProbe::from_config(&config.replicas);
    let router = ReplicaRouter::from_config(&config, probe, pins.clone())?;

    match cli.command {
        Commands::Check => {
            println!("{}", serde_json::to_string_pretty(&router.status())?);
        }
        Commands::Route { reads, pin } => {
            let key = pin.unwrap_or_default();
            if !key.is_empty() {
                pins.pin(key.clone());
            }
            route_batch(&router, &key, reads).await?;
        }
        Commands::Monitor { interval_ms } => {
            monitor(&router, &config, Duration::from_millis(interval_ms)).await;
        }
    }

    Ok(())
}

async fn route_batch(router: &Router, key: &str, reads: usize) -> Result<(), serde_json::Error> {
    let mut targets: BTreeMap<String, usize> = BTreeMap::new();
    for _ in 0..reads {
        let target = router.route_read(key).await;
        *targets.entry(target.to_string()).or_default() += 1;
    }

    let report = serde_json::json!({
        "reads": reads,
        "targets": targets,
        "status": router.status(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn monitor(router: &Router, config: &RouterConfig, interval: Duration) {
    let mut shutdown = Shutdown::new();
    shutdown.spawn_refresher(RefreshTask::new(
        router.monitor().clone(),
        Duration::from_millis(config.health.refresh_interval_ms),
    ));

    let mut ticker = time::interval(interval);
    let stop = signals::wait_for_signal();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let target = router.route_read("").await;
                router.pin_source().purge_expired();
                let status = router.status();
                let available = status.replicas.iter().filter(|r| r.available).count();
                tracing::info!(target_db = %target, available, total = status.replicas.len(), "Routed read");
            }
            _ = &mut stop => break,
        }
    }

    let stopped = shutdown.drain(SHUTDOWN_GRACE).await;
    tracing::info!(stopped, "Shutdown complete");
}
