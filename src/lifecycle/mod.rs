//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Build router → Shutdown::spawn_refresher
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → drain refreshers with a grace period → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any configuration error is fatal before the router exists
//! - Router state needs no teardown; only background tasks are stopped

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
