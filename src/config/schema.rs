//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the replica router.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Name of the primary connection; receives writes and degraded reads.
    pub primary: String,

    /// Replica connections serving reads, in rotation order.
    pub replicas: Vec<ReplicaConfig>,

    /// Probe and backoff settings.
    pub health: HealthConfig,

    /// Read-after-write pinning settings.
    pub pinning: PinningConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary: "default".to_string(),
            replicas: Vec::new(),
            health: HealthConfig::default(),
            pinning: PinningConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Replica connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicaConfig {
    /// Unique replica identifier.
    pub name: String,

    /// Address probed for liveness (e.g., "10.0.0.12:5432").
    pub address: String,
}

/// Health tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds a failed replica stays out of rotation.
    pub backoff_secs: u64,

    /// Upper bound on a single probe in milliseconds.
    pub probe_timeout_ms: u64,

    /// Interval of the background refresher in milliseconds.
    pub refresh_interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 60,
            probe_timeout_ms: 2000,
            refresh_interval_ms: 1000,
        }
    }
}

/// Pinning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PinningConfig {
    /// Seconds a client stays pinned to the primary after a write.
    /// Should exceed the worst expected replication lag.
    pub window_secs: u64,
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self { window_secs: 15 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
