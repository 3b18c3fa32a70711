//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → ReplicaRouter::from_config
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; the replica set never changes at runtime
//! - All fields have defaults to allow minimal configs
//! - Any validation error keeps the router out of service

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{HealthConfig, ObservabilityConfig, PinningConfig, ReplicaConfig, RouterConfig};
pub use validation::ValidationError;
