//! Process-wide, informational-only connection counters.
//!
//! Nothing here gates behavior; a session never checks these before acting.
//! They exist purely to be logged or (eventually) exported.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    live: AtomicU64,
    total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Call once a session is accepted and about to start.
    pub fn session_started(&self) {
        self.live.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Call once a session's task finishes, regardless of outcome.
    pub fn session_ended(&self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn live_connections(&self) -> u64 {
        self.live.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
