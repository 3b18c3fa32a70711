//! Read-after-write pinning.
//!
//! # Responsibilities
//! - Decide whether a calling context must read from the primary
//! - Provide pin sources: per-client markers with an expiry window, and
//!   task-scoped pins for code that has just written
//!
//! # Design Decisions
//! - Pin checks are pure queries; they never touch replica health state
//! - Markers expire on their own; `purge_expired` only reclaims memory

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Source of the pin flag for a calling context of type `C`.
pub trait PinSource<C: ?Sized>: Send + Sync {
    fn is_pinned(&self, ctx: &C) -> bool;
}

/// Pin source for deployments without read-after-write pinning.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPinned;

impl<C: ?Sized> PinSource<C> for NeverPinned {
    fn is_pinned(&self, _ctx: &C) -> bool {
        false
    }
}

tokio::task_local! {
    static TASK_PINNED: ();
}

/// Run `fut` with every read inside it pinned to the primary.
pub async fn pinned_scope<F: Future>(fut: F) -> F::Output {
    TASK_PINNED.scope((), fut).await
}

/// True when called inside [`pinned_scope`].
pub fn is_task_pinned() -> bool {
    TASK_PINNED.try_with(|_| ()).is_ok()
}

/// Pin source backed by [`pinned_scope`]; the context value is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskPin;

impl<C: ?Sized> PinSource<C> for TaskPin {
    fn is_pinned(&self, _ctx: &C) -> bool {
        is_task_pinned()
    }
}

/// Short-lived pin markers keyed by client (session id, cookie value, ...).
///
/// A client that has just written is pinned for `window`, which should exceed
/// the replication lag.
#[derive(Debug, Clone)]
pub struct PinStore {
    markers: Arc<DashMap<String, Instant>>,
    window: Duration,
}

impl PinStore {
    /// Empty store whose pins last `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            markers: Arc::new(DashMap::new()),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Pin `key` until `now + window`, extending any existing pin.
    pub fn pin_at(&self, key: impl Into<String>, now: Instant) {
        let expires_at = now + self.window;
        self.markers
            .entry(key.into())
            .and_modify(|at| *at = (*at).max(expires_at))
            .or_insert(expires_at);
    }

    pub fn pin(&self, key: impl Into<String>) {
        self.pin_at(key, Instant::now());
    }

    pub fn unpin(&self, key: &str) {
        self.markers.remove(key);
    }

    /// True if `key` was pinned less than one window before `now`.
    pub fn is_pinned_at(&self, key: &str, now: Instant) -> bool {
        self.markers.get(key).is_some_and(|at| now < *at)
    }

    /// Drop expired markers. Returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.markers.len();
        self.markers.retain(|_, at| now < *at);
        before.saturating_sub(self.markers.len())
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl PinSource<str> for PinStore {
    fn is_pinned(&self, key: &str) -> bool {
        self.is_pinned_at(key, Instant::now())
    }
}

/// Consults a pin source before replica selection.
#[derive(Debug, Clone, Default)]
pub struct PinningGate<S> {
    source: S,
}

impl<S> PinningGate<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_pinned<C: ?Sized>(&self, ctx: &C) -> bool
    where
        S: PinSource<C>,
    {
        self.source.is_pinned(ctx)
    }
}
