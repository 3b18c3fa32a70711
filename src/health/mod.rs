//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Read request:
//!     → monitor.rs maybe_refresh (re-admit replicas past their backoff)
//!     → draw next replica from the rotation
//!     → probe.rs (bounded connectivity check, no lock held)
//!     → success: replica  |  failure/timeout: disable + primary
//!
//! Idle periods (refresher.rs):
//!     Periodic timer → maybe_refresh
//! ```
//!
//! # Design Decisions
//! - A single failed probe disables a replica; no thresholds
//! - Re-admission is optimistic (time based, no confirming probe)
//! - Probe failures never reach the caller

pub mod monitor;
pub mod probe;
pub mod refresher;

pub use monitor::{HealthMonitor, HealthSettings, Selection, SelectionOutcome};
pub use probe::{ConnectionProbe, ProbeError, TcpProbe};
pub use refresher::RefreshTask;
