//! A bounded, TTL-based lookup cache with single-flight deduplication.
//!
//! [`SingleFlightCache`] wraps an expensive lookup function.  At most one
//! call to that function runs per key at any time; concurrent callers for the
//! same key wait for it and share its outcome.  Successful outcomes are reused
//! until their TTL elapses.  When the cache is full, a new key displaces a
//! stale entry if there is one, otherwise the entry closest to expiring.

mod builder;
mod cache;
mod config;
mod context;
mod error;
mod metrics;
mod store;
mod sync;
pub mod listener;
pub mod resolver;

pub use builder::CacheBuilder;
pub use cache::SingleFlightCache;
pub use config::CacheConfig;
pub use context::Context;
pub use error::{ContextError, LookupError};
pub use metrics::stats::Metrics;
