//! Errors returned by the cache and by [`Context`](crate::Context).

use std::sync::Arc;

/// Why a [`Context`](crate::Context) stopped accepting work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// [`Context::cancel`](crate::Context::cancel) was called.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Error returned by [`SingleFlightCache::lookup`](crate::SingleFlightCache::lookup).
///
/// The cache has no error conditions of its own: it either hands back the
/// error produced by the lookup function, or reports that the caller gave up
/// while waiting on somebody else's lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError<E> {
    /// The lookup function failed.
    ///
    /// Every caller that shared the same in-flight lookup receives a clone of
    /// the same `Arc`.
    #[error("lookup failed: {0}")]
    Failed(Arc<E>),
    /// The caller's context ended while it was waiting for an in-flight lookup.
    #[error("waiting for in-flight lookup: {0}")]
    Canceled(#[source] ContextError),
}

impl<E> LookupError<E> {
    /// Returns `true` if this error came from the waiter's context rather than
    /// from the lookup function.
    pub fn is_canceled(&self) -> bool {
        matches!(self, LookupError::Canceled(_))
    }

    /// The lookup function's error, if that is what this is.
    pub fn lookup_error(&self) -> Option<&E> {
        match self {
            LookupError::Failed(err) => Some(err),
            LookupError::Canceled(_) => None,
        }
    }
}

impl<E> Clone for LookupError<E> {
    fn clone(&self) -> Self {
        match self {
            LookupError::Failed(err) => LookupError::Failed(Arc::clone(err)),
            LookupError::Canceled(err) => LookupError::Canceled(*err),
        }
    }
}

impl<E> From<ContextError> for LookupError<E> {
    fn from(err: ContextError) -> Self {
        LookupError::Canceled(err)
    }
}
