//! Replica bookkeeping and selection.
//!
//! # Data Flow
//! ```text
//! Configured replica names
//!     → registry.rs (availability + reconnect deadline per replica)
//!     → available ids, in configuration order
//!     → round_robin.rs (rotation rebuilt on every transition)
//!     → next() yields a replica, or the primary when none is available
//! ```
//!
//! # Design Decisions
//! - Registry is plain data; the health monitor owns its lock
//! - Rotation is read lock-free (atomic swap of the member list)
//! - The primary is never part of the rotation

pub mod registry;
pub mod replica;
pub mod round_robin;

pub use registry::{RegistryError, ReplicaRegistry, ReplicaStatus};
pub use replica::{ReplicaId, ReplicaState};
pub use round_robin::SelectionCycle;
