use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated on every cache operation.
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,
    evictions: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        StatsCounter {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the statistics.
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metrics {
    /// Lookups answered from a fresh entry.
    pub hits: u64,
    /// Lookups that called the lookup function.
    pub misses: u64,
    /// Lookups that joined somebody else's in-flight lookup and shared its outcome.
    pub coalesced: u64,
    /// Calls to the lookup function that returned an error.
    pub failures: u64,
    /// Joined lookups abandoned because the caller's context ended.
    pub cancellations: u64,
    /// Entries removed to make room for a new key.
    pub evictions: u64,
}

impl Metrics {
    /// Lookups that produced an outcome, however it was obtained.
    pub fn request_count(&self) -> u64 {
        self.hits + self.misses + self.coalesced
    }

    /// `hits / request_count`, or `0.0` if nothing was looked up yet.
    ///
    /// Coalesced lookups are not hits: they waited on the lookup function.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}
