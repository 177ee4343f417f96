//! Caching host resolver built on [`SingleFlightCache`].
//!
//! Concurrent resolutions of the same host share one call to the resolver,
//! and successful answers are reused for the cache's TTL.  Failed resolutions
//! are never reused.
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use flightcache::resolver::CachingResolver;
//! use flightcache::Context;
//!
//! let resolver = CachingResolver::new(128, Duration::from_secs(30));
//! let addrs = resolver.lookup_host(&Context::new(), "127.0.0.1").unwrap();
//! assert_eq!(*addrs, vec!["127.0.0.1".to_string()]);
//! ```

use std::io;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::SingleFlightCache;
use crate::context::Context;
use crate::error::{ContextError, LookupError};

/// Resolves hosts to their IP addresses, written as strings.
pub struct CachingResolver {
    cache: SingleFlightCache<Vec<String>, io::Error>,
}

impl CachingResolver {
    /// A resolver backed by the operating system's resolver.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_lookup(system_lookup, capacity, ttl)
    }

    /// A resolver backed by `lookup`, for custom resolvers and tests.
    pub fn with_lookup<F>(lookup: F, capacity: usize, ttl: Duration) -> Self
    where
        F: Fn(&Context, &str) -> io::Result<Vec<String>> + Send + Sync + 'static,
    {
        CachingResolver {
            cache: SingleFlightCache::new(lookup, capacity, ttl),
        }
    }

    /// Returns the addresses of `host`.
    pub fn lookup_host(
        &self,
        ctx: &Context,
        host: &str,
    ) -> Result<Arc<Vec<String>>, LookupError<io::Error>> {
        self.cache.lookup(ctx, host)
    }

    /// The underlying cache, for removal and statistics.
    pub fn cache(&self) -> &SingleFlightCache<Vec<String>, io::Error> {
        &self.cache
    }
}

/// Resolves `host` with [`ToSocketAddrs`].
///
/// The addresses keep the resolver's order with duplicates removed; the same
/// address typically comes back once per socket type.
fn system_lookup(ctx: &Context, host: &str) -> io::Result<Vec<String>> {
    if let Some(err) = ctx.err() {
        let kind = match err {
            ContextError::Canceled => io::ErrorKind::Interrupted,
            ContextError::DeadlineExceeded => io::ErrorKind::TimedOut,
        };
        return Err(io::Error::new(kind, err));
    }

    let mut addrs: Vec<String> = Vec::new();
    for addr in (host, 0).to_socket_addrs()? {
        let ip = addr.ip().to_string();
        if !addrs.contains(&ip) {
            addrs.push(ip);
        }
    }
    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses found for {host}"),
        ));
    }
    Ok(addrs)
}
