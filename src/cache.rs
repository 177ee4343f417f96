use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::builder::CacheBuilder;
use crate::context::Context;
use crate::error::LookupError;
use crate::listener::{EvictionCause, EvictionListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::store::{Entry, EntryTable, Outcome};
use crate::sync::{channel, Listener, Notifier};

/// Longest TTL the cache will apply.  Longer values are clamped so that
/// `now + ttl` can always be represented.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The expensive call whose results the cache holds.
pub(crate) type LookupFn<V, E> = dyn Fn(&Context, &str) -> Result<V, E> + Send + Sync;

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of a [`SingleFlightCache`].
pub(crate) struct Inner<V, E> {
    entries: RwLock<EntryTable<V, E>>,
    ttl: Duration,
    lookup: Box<LookupFn<V, E>>,
    /// Optional eviction listener.  `None` if the user didn't register one.
    listener: Option<Box<dyn EvictionListener<V>>>,
    metrics: StatsCounter,
}

// ---------------------------------------------------------------------------
// Lookup states
// ---------------------------------------------------------------------------

/// Where a [`SingleFlightCache::lookup`] call currently is.
///
/// Every transition takes the lock it needs and releases it before the next
/// state runs, so no guard is ever held while blocking or while the lookup
/// function runs.
enum State {
    /// Read-locked check for a fresh or in-flight entry.
    Probe,
    /// Blocked on another caller's lookup.
    Join(Listener),
    /// Write-locked attempt to become the caller performing the lookup.
    Claim,
}

/// What a read of the table found.
enum Slot<V, E> {
    Ready(Outcome<V, E>),
    InFlight(Listener),
    Vacant,
}

/// What an attempt to claim a key found.
enum Claim<'a, V, E> {
    Ready(Outcome<V, E>),
    InFlight(Listener),
    Owner(Flight<'a, V, E>),
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A bounded, TTL-based lookup cache that runs at most one lookup per key at
/// a time.
///
/// Concurrent [`lookup`](Self::lookup) calls for the same key share a single
/// call to the lookup function and all receive its outcome.  Successful
/// outcomes are served from the cache until their TTL elapses.  Failed
/// outcomes are handed to everybody waiting on that call but are never served
/// to later callers.
///
/// # Example
/// ```
/// use std::convert::Infallible;
/// use std::time::Duration;
///
/// use flightcache::{Context, SingleFlightCache};
///
/// let cache = SingleFlightCache::new(
///     |_ctx: &Context, key: &str| Ok::<_, Infallible>(key.to_uppercase()),
///     100,
///     Duration::from_secs(60),
/// );
///
/// let value = cache.lookup(&Context::new(), "hello").unwrap();
/// assert_eq!(value.as_str(), "HELLO");
/// assert_eq!(cache.len(), 1);
/// ```
pub struct SingleFlightCache<V, E> {
    inner: Arc<Inner<V, E>>,
}

impl<V, E> Clone for SingleFlightCache<V, E> {
    fn clone(&self) -> Self {
        SingleFlightCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> SingleFlightCache<V, E>
where
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` keys (at least one), whose
    /// successful entries stay fresh for `ttl`.
    pub fn new<F>(lookup: F, capacity: usize, ttl: Duration) -> Self
    where
        F: Fn(&Context, &str) -> Result<V, E> + Send + Sync + 'static,
    {
        Self::from_parts(Box::new(lookup), capacity, ttl, None)
    }

    pub(crate) fn from_parts(
        lookup: Box<LookupFn<V, E>>,
        capacity: usize,
        ttl: Duration,
        listener: Option<Box<dyn EvictionListener<V>>>,
    ) -> Self {
        SingleFlightCache {
            inner: Arc::new(Inner {
                entries: RwLock::new(EntryTable::new(capacity)),
                ttl: ttl.min(MAX_TTL),
                lookup,
                listener,
                metrics: StatsCounter::new(),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(capacity: usize) -> CacheBuilder<V> {
        CacheBuilder::new(capacity)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Returns the outcome for `key`, calling the lookup function only if no
    /// fresh entry exists and no other caller is already looking it up.
    ///
    /// If another caller's lookup for `key` is in flight, this blocks until
    /// it finishes or `ctx` ends.  An ending `ctx` only releases this caller;
    /// the in-flight lookup keeps running for everybody else.  When this
    /// caller performs the lookup itself, `ctx` is passed to the lookup
    /// function and is not otherwise observed.
    pub fn lookup(&self, ctx: &Context, key: &str) -> Result<Arc<V>, LookupError<E>> {
        let mut state = State::Probe;
        loop {
            state = match state {
                State::Probe => match self.probe(key) {
                    Slot::Ready(outcome) => {
                        self.inner.metrics.record_hit();
                        return outcome.map_err(LookupError::Failed);
                    }
                    Slot::InFlight(listener) => State::Join(listener),
                    Slot::Vacant => State::Claim,
                },

                State::Join(listener) => {
                    trace!(key, "joining in-flight lookup");
                    if let Err(err) = listener.wait(ctx) {
                        self.inner.metrics.record_cancellation();
                        debug!(key, %err, "stopped waiting for in-flight lookup");
                        return Err(LookupError::Canceled(err));
                    }
                    match self.published(key) {
                        Slot::Ready(outcome) => {
                            self.inner.metrics.record_coalesced();
                            return outcome.map_err(LookupError::Failed);
                        }
                        // A new lookup started after the one we waited on.
                        Slot::InFlight(next) => State::Join(next),
                        // Removed while we waited.
                        Slot::Vacant => State::Claim,
                    }
                }

                State::Claim => match self.claim(key) {
                    Claim::Ready(outcome) => {
                        self.inner.metrics.record_hit();
                        return outcome.map_err(LookupError::Failed);
                    }
                    Claim::InFlight(listener) => State::Join(listener),
                    Claim::Owner(flight) => return self.perform(ctx, flight),
                },
            };
        }
    }

    /// Fast path: serve a fresh entry or find an in-flight lookup to join.
    fn probe(&self, key: &str) -> Slot<V, E> {
        let now = Instant::now();
        let entries = self.inner.entries.read();
        let Some(entry) = entries.get(key) else {
            return Slot::Vacant;
        };
        match entry {
            Entry::InFlight(listener) => Slot::InFlight(listener.clone()),
            Entry::Settled { outcome, .. } if entry.is_fresh(now) => Slot::Ready(outcome.clone()),
            Entry::Settled { .. } => Slot::Vacant,
        }
    }

    /// Reads what a finished lookup left behind.
    ///
    /// A settled entry is returned whether or not it is still fresh: every
    /// caller that joined a lookup gets that lookup's outcome.
    fn published(&self, key: &str) -> Slot<V, E> {
        match self.inner.entries.read().get(key) {
            Some(Entry::Settled { outcome, .. }) => Slot::Ready(outcome.clone()),
            Some(Entry::InFlight(listener)) => Slot::InFlight(listener.clone()),
            None => Slot::Vacant,
        }
    }

    /// Installs an in-flight placeholder for `key`, unless somebody got there
    /// first since the last probe.
    fn claim<'a>(&'a self, key: &'a str) -> Claim<'a, V, E> {
        let now = Instant::now();
        let (notifier, listener) = channel();

        let evicted = {
            let mut entries = self.inner.entries.write();
            if let Some(entry) = entries.get(key) {
                match entry {
                    Entry::InFlight(running) => return Claim::InFlight(running.clone()),
                    Entry::Settled { outcome, .. } if entry.is_fresh(now) => {
                        return Claim::Ready(outcome.clone());
                    }
                    Entry::Settled { .. } => {}
                }
            }
            entries.insert(key, Entry::InFlight(listener.clone()), now)
        };
        trace!(key, "claimed lookup");
        self.inner.dispatch(evicted, EvictionCause::Capacity);

        Claim::Owner(Flight {
            inner: &*self.inner,
            key,
            listener,
            notifier: Some(notifier),
        })
    }

    /// Calls the lookup function and publishes its outcome.
    fn perform(&self, ctx: &Context, flight: Flight<'_, V, E>) -> Result<Arc<V>, LookupError<E>> {
        self.inner.metrics.record_miss();
        let outcome: Outcome<V, E> = (self.inner.lookup)(ctx, flight.key)
            .map(Arc::new)
            .map_err(Arc::new);
        if outcome.is_err() {
            self.inner.metrics.record_failure();
        }
        flight.settle(outcome.clone());
        outcome.map_err(LookupError::Failed)
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Discards the entry for `key`, if any.
    ///
    /// A lookup in flight for `key` keeps running.  Its waiters find the key
    /// gone when they wake and start over.
    pub fn remove(&self, key: &str) {
        let removed = self.inner.entries.write().remove(key);
        if removed.is_some() {
            trace!(key, "removed entry");
        }
        self.inner
            .dispatch(removed.map(|entry| (key.to_owned(), entry)), EvictionCause::Explicit);
    }

    /// Discards every entry.
    ///
    /// Lookups in flight keep running and insert their outcome as a new key
    /// once they finish.
    pub fn reset(&self) {
        let drained = self.inner.entries.write().drain();
        debug!(entries = drained.len(), "reset cache");
        for evicted in drained {
            self.inner.dispatch(Some(evicted), EvictionCause::Cleared);
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of tracked keys, in-flight and stale ones included.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `key` is tracked, fresh or not.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.entries.read().contains(key)
    }

    pub fn capacity(&self) -> usize {
        self.inner.entries.read().capacity()
    }

    pub fn time_to_live(&self) -> Duration {
        self.inner.ttl
    }

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }
}

impl<V: 'static, E> Inner<V, E> {
    /// Records a removed entry and reports it to the listener.
    ///
    /// Must be called without holding the entries lock.
    fn dispatch(&self, removed: Option<(String, Entry<V, E>)>, cause: EvictionCause) {
        let Some((key, entry)) = removed else { return };
        if cause == EvictionCause::Capacity {
            self.metrics.record_eviction();
            debug!(key = key.as_str(), "evicted entry to stay within capacity");
        }
        if let (Some(listener), Some(value)) = (&self.listener, entry.value()) {
            listener.on_evict(&key, Arc::clone(value), cause);
        }
    }
}

// ---------------------------------------------------------------------------
// In-flight ownership
// ---------------------------------------------------------------------------

/// Proof that the current caller performs the lookup for `key`.
///
/// Holds the only [`Notifier`] for the placeholder it installed.  Settling
/// publishes the outcome and then fires the signal.  If the guard is dropped
/// unsettled, which only happens when the lookup function panics, the
/// placeholder is removed before the signal fires so waiters start over
/// instead of finding a dead placeholder.
struct Flight<'a, V, E> {
    inner: &'a Inner<V, E>,
    key: &'a str,
    listener: Listener,
    notifier: Option<Notifier>,
}

impl<V, E> Flight<'_, V, E> {
    /// Returns `true` if the table still holds this flight's placeholder.
    fn owns(&self, entries: &EntryTable<V, E>) -> bool {
        matches!(entries.get(self.key), Some(Entry::InFlight(l)) if l.same_signal(&self.listener))
    }
}

impl<V: 'static, E> Flight<'_, V, E> {
    fn settle(mut self, outcome: Outcome<V, E>) {
        let now = Instant::now();
        let expires_at = outcome.is_ok().then(|| now + self.inner.ttl);

        let evicted = {
            let mut entries = self.inner.entries.write();
            let superseded = !self.owns(&entries)
                && matches!(entries.get(self.key), Some(Entry::InFlight(_)));
            if superseded {
                // Removed and claimed again while we ran; that lookup publishes.
                trace!(key = self.key, "newer lookup in flight, not publishing");
                None
            } else {
                entries.insert(self.key, Entry::Settled { outcome, expires_at }, now)
            }
        };
        trace!(key = self.key, "settled lookup");

        if let Some(notifier) = self.notifier.take() {
            notifier.notify();
        }
        self.inner.dispatch(evicted, EvictionCause::Capacity);
    }
}

impl<V, E> Drop for Flight<'_, V, E> {
    fn drop(&mut self) {
        let Some(notifier) = self.notifier.take() else { return };
        {
            let mut entries = self.inner.entries.write();
            if self.owns(&entries) {
                entries.remove(self.key);
            }
        }
        debug!(key = self.key, "lookup abandoned without an outcome");
        notifier.notify();
    }
}
