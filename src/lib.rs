//! Primary/replica database router.
//!
//! Sends reads to a pool of replica connections in round-robin order and all
//! writes to the primary. Replicas that fail a connectivity probe are taken
//! out of rotation for a backoff period and re-admitted afterwards. Contexts
//! pinned after a write read from the primary to avoid replication lag.
//!
//! ```text
//!   route_read(ctx) ──▶ pinning ──pinned──▶ primary
//!                          │
//!                          ▼
//!                    health monitor ──▶ rotation ──▶ probe ──ok──▶ replica
//!                          ▲                           │
//!                          └──────── disable ◀──fail───┴──────────▶ primary
//! ```

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod routing;

pub use config::RouterConfig;
pub use health::{ConnectionProbe, HealthMonitor, ProbeError, TcpProbe};
pub use lifecycle::Shutdown;
pub use load_balancer::ReplicaId;
pub use routing::{ReplicaRouter, RouterBuilder};
