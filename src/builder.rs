//! Builder for [`SingleFlightCache`].

use std::sync::Arc;
use std::time::Duration;

use crate::cache::SingleFlightCache;
use crate::config::CacheConfig;
use crate::context::Context;
use crate::listener::{EvictionCause, EvictionListener, FnListener};

/// Builder for configuring and constructing a [`SingleFlightCache`].
///
/// # Example
/// ```
/// use std::io;
/// use std::time::Duration;
///
/// use flightcache::{CacheBuilder, Context};
///
/// let cache = CacheBuilder::new(1_000)
///     .time_to_live(Duration::from_secs(60))
///     .build(|_ctx: &Context, key: &str| -> io::Result<usize> { Ok(key.len()) });
/// assert_eq!(cache.capacity(), 1_000);
/// ```
pub struct CacheBuilder<V> {
    capacity: usize,
    ttl: Duration,
    listener: Option<Box<dyn EvictionListener<V>>>,
}

impl<V: 'static> CacheBuilder<V> {
    /// Starts a builder for a cache of at most `capacity` keys.
    ///
    /// A capacity of zero is raised to one.  The TTL defaults to
    /// [`CacheConfig::default`]'s.
    pub fn new(capacity: usize) -> Self {
        CacheBuilder {
            capacity,
            ttl: CacheConfig::default().ttl,
            listener: None,
        }
    }

    /// Starts a builder from deserialized settings.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity).time_to_live(config.ttl)
    }

    /// Each successful entry stays fresh for `ttl` after its lookup finished.
    ///
    /// A zero TTL caches nothing across calls but still coalesces concurrent
    /// lookups.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Register an eviction listener closure.
    ///
    /// The closure runs on the thread that removed the entry, after the cache
    /// lock has been released.
    pub fn eviction_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Arc<V>, EvictionCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an eviction listener via the [`EvictionListener`] trait.
    pub fn eviction_listener_impl<L: EvictionListener<V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }
}

impl<V> CacheBuilder<V>
where
    V: Send + Sync + 'static,
{
    /// Builds the cache around `lookup`, the call whose results it holds.
    pub fn build<E, F>(self, lookup: F) -> SingleFlightCache<V, E>
    where
        E: Send + Sync + 'static,
        F: Fn(&Context, &str) -> Result<V, E> + Send + Sync + 'static,
    {
        SingleFlightCache::from_parts(Box::new(lookup), self.capacity, self.ttl, self.listener)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    fn echo(_ctx: &Context, key: &str) -> Result<String, Infallible> {
        Ok(key.to_owned())
    }

    #[test]
    fn defaults() {
        let cache = CacheBuilder::new(0).build(echo);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.time_to_live(), CacheConfig::default().ttl);
    }

    #[test]
    fn from_config_applies_settings() {
        let config = CacheConfig {
            capacity: 7,
            ttl: Duration::from_secs(5),
        };
        let cache = CacheBuilder::from_config(&config).build(echo);
        assert_eq!(cache.capacity(), 7);
        assert_eq!(cache.time_to_live(), Duration::from_secs(5));
    }
}
