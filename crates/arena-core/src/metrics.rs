//! Process-wide counters for arena runs.
//!
//! Counters are bumped silently at the call site; [`Metrics::flush`] emits
//! the current values as one `info!` event, typically at the end of a
//! command.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free atomic counters.
pub struct Metrics {
    matches_run: AtomicU64,
    events_emitted: AtomicU64,
    fallbacks_substituted: AtomicU64,
    decode_recoveries: AtomicU64,
    setup_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            matches_run: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            fallbacks_substituted: AtomicU64::new(0),
            decode_recoveries: AtomicU64::new(0),
            setup_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_matches_run(&self) {
        self.matches_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "matches_run", "counter incremented");
    }

    pub fn inc_events_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallbacks(&self) {
        self.fallbacks_substituted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fallbacks_substituted", "counter incremented");
    }

    /// A decode that needed a tolerant strategy (anything but `direct`).
    pub fn inc_decode_recoveries(&self) {
        self.decode_recoveries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decode_recoveries", "counter incremented");
    }

    pub fn inc_setup_failures(&self) {
        self.setup_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "setup_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            matches_run = self.matches_run(),
            events_emitted = self.events_emitted(),
            fallbacks_substituted = self.fallbacks_substituted(),
            decode_recoveries = self.decode_recoveries(),
            setup_failures = self.setup_failures(),
        );
    }

    pub fn matches_run(&self) -> u64 {
        self.matches_run.load(Ordering::Relaxed)
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn fallbacks_substituted(&self) -> u64 {
        self.fallbacks_substituted.load(Ordering::Relaxed)
    }

    pub fn decode_recoveries(&self) -> u64 {
        self.decode_recoveries.load(Ordering::Relaxed)
    }

    pub fn setup_failures(&self) -> u64 {
        self.setup_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.matches_run.store(0, Ordering::Relaxed);
        self.events_emitted.store(0, Ordering::Relaxed);
        self.fallbacks_substituted.store(0, Ordering::Relaxed);
        self.decode_recoveries.store(0, Ordering::Relaxed);
        self.setup_failures.store(0, Ordering::Relaxed);
    }
}
