//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Read (calling context)
//!     → pinning.rs (pinned? → primary)
//!     → health monitor (refresh, draw, probe)
//!     → replica, or primary on failure
//!
//! Write / migration
//!     → router.rs → primary
//! ```
//!
//! # Design Decisions
//! - The router is an explicit instance shared by reference, not global state
//! - Routing never returns an error; degraded reads go to the primary
//! - Pin state is owned by the caller's request layer, queried read-only here

pub mod pinning;
pub mod router;

pub use pinning::{is_task_pinned, pinned_scope, NeverPinned, PinSource, PinStore, PinningGate, TaskPin};
pub use router::{ReplicaRouter, RouterBuilder, RouterStatus};
