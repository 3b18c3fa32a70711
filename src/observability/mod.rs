//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing and health transitions produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Disablements are warnings, re-admissions are info, routing decisions are debug
//! - Metric updates are cheap and safe to make on every read

pub mod logging;
pub mod metrics;
