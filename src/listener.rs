//! Eviction listener, a callback invoked whenever a cached value leaves the cache.
//!
//! Only entries that hold a successful value are reported.  Placeholders for
//! in-flight lookups and failed lookups have nothing to hand over.
//!
//! # Example
//! ```
//! use std::convert::Infallible;
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! use flightcache::listener::EvictionCause;
//! use flightcache::{CacheBuilder, Context};
//!
//! let log: Arc<Mutex<Vec<(String, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache = CacheBuilder::new(1)
//!     .time_to_live(Duration::from_secs(60))
//!     .eviction_listener(move |key: &str, _val, cause| {
//!         log2.lock().unwrap().push((key.to_string(), cause));
//!     })
//!     .build(|_ctx: &Context, key: &str| Ok::<_, Infallible>(key.len()));
//!
//! let ctx = Context::new();
//! cache.lookup(&ctx, "a").unwrap();
//! cache.lookup(&ctx, "b").unwrap(); // capacity eviction of "a"
//! cache.remove("b"); // explicit removal
//!
//! assert_eq!(
//!     *log.lock().unwrap(),
//!     vec![
//!         ("a".to_string(), EvictionCause::Capacity),
//!         ("b".to_string(), EvictionCause::Explicit),
//!     ]
//! );
//! ```

use std::sync::Arc;

// ---------------------------------------------------------------------------
// EvictionCause
// ---------------------------------------------------------------------------

/// The reason an entry was removed from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictionCause {
    /// Removed to make room for a new key while the cache was full.
    Capacity,
    /// Removed via [`SingleFlightCache::remove`].
    ///
    /// [`SingleFlightCache::remove`]: crate::SingleFlightCache::remove
    Explicit,
    /// Removed via [`SingleFlightCache::reset`].
    ///
    /// [`SingleFlightCache::reset`]: crate::SingleFlightCache::reset
    Cleared,
}

// ---------------------------------------------------------------------------
// EvictionListener trait
// ---------------------------------------------------------------------------

/// A callback invoked each time a cached value is evicted or removed.
///
/// The callback runs on the thread that caused the removal, after the cache
/// has released its lock, so calling back into the cache is allowed.
pub trait EvictionListener<V>: Send + Sync + 'static {
    fn on_evict(&self, key: &str, value: Arc<V>, cause: EvictionCause);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`CacheBuilder::eviction_listener`](crate::CacheBuilder::eviction_listener).
pub struct FnListener<F>(pub F);

impl<V, F> EvictionListener<V> for FnListener<F>
where
    F: Fn(&str, Arc<V>, EvictionCause) + Send + Sync + 'static,
{
    fn on_evict(&self, key: &str, value: Arc<V>, cause: EvictionCause) {
        (self.0)(key, value, cause)
    }
}
