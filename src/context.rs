//! Cancellation handle passed through [`SingleFlightCache::lookup`].
//!
//! A [`Context`] bounds how long a caller is willing to wait for somebody
//! else's in-flight lookup, and is handed on to the lookup function so it can
//! bound its own work the same way.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use flightcache::{Context, ContextError};
//!
//! let ctx = Context::with_timeout(Duration::from_secs(5));
//! assert!(!ctx.is_done());
//!
//! ctx.cancel();
//! assert_eq!(ctx.err(), Some(ContextError::Canceled));
//! ```
//!
//! [`SingleFlightCache::lookup`]: crate::SingleFlightCache::lookup

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::ContextError;
use crate::sync::Wake;

/// A cloneable cancellation token with an optional deadline.
///
/// Clones share state: canceling one cancels them all.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    deadline: Option<Instant>,
    /// `false` for [`Context::background`].
    cancelable: bool,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    canceled: bool,
    /// Waiters currently blocked on this context.
    hooks: Vec<(u64, Weak<dyn Wake>)>,
    next_hook: u64,
}

impl Context {
    /// A context that never ends.  [`cancel`](Self::cancel) has no effect on it.
    pub fn background() -> Self {
        Self::build(None, false)
    }

    /// A context with no deadline.  It ends only when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::build(None, true)
    }

    /// A context that ends `timeout` from now, or earlier if canceled.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout), true)
    }

    /// A context that ends at `deadline`, or earlier if canceled.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline), true)
    }

    fn build(deadline: Option<Instant>, cancelable: bool) -> Self {
        Context {
            inner: Arc::new(Inner {
                deadline,
                cancelable,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Cancels the context and wakes everybody blocked on it.
    ///
    /// Canceling twice is harmless.
    pub fn cancel(&self) {
        if !self.inner.cancelable {
            return;
        }
        let hooks: Vec<Arc<dyn Wake>> = {
            let mut state = self.inner.state.lock();
            if state.canceled {
                return;
            }
            state.canceled = true;
            state.hooks.iter().filter_map(|(_, hook)| hook.upgrade()).collect()
        };
        // Woken outside the state lock: waiters check `err()` while holding
        // their own signal lock.
        for hook in hooks {
            hook.wake();
        }
    }

    /// Why the context ended, or `None` while it is still live.
    ///
    /// Explicit cancellation takes precedence over an elapsed deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.inner.state.lock().canceled {
            return Some(ContextError::Canceled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Registers `hook` to be woken on cancellation for as long as the
    /// returned guard lives.
    pub(crate) fn register(&self, hook: Weak<dyn Wake>) -> Registration<'_> {
        let mut state = self.inner.state.lock();
        state.hooks.retain(|(_, h)| h.strong_count() > 0);
        let id = state.next_hook;
        state.next_hook += 1;
        state.hooks.push((id, hook));
        Registration { ctx: self, id }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("canceled", &state.canceled)
            .field("waiters", &state.hooks.len())
            .finish()
    }
}

/// Removes a wake hook from its context when dropped.
pub(crate) struct Registration<'a> {
    ctx: &'a Context,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut state = self.ctx.inner.state.lock();
        state.hooks.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountWakes(AtomicUsize);

    impl Wake for CountWakes {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn new_context_is_live() {
        let ctx = Context::new();
        assert_eq!(ctx.err(), None);
        assert_eq!(ctx.deadline(), None);
    }

    #[test]
    fn background_context_ignores_cancel() {
        let ctx = Context::background();
        ctx.cancel();
        assert_eq!(ctx.err(), None);
        assert!(!ctx.clone().is_done());
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = Context::new();
        let other = ctx.clone();
        other.cancel();
        other.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }

    #[test]
    fn elapsed_deadline_reports_deadline_exceeded() {
        let ctx = Context::with_deadline(Instant::now());
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));

        ctx.cancel();
        assert_eq!(ctx.err(), Some(ContextError::Canceled));
    }

    #[test]
    fn cancel_wakes_registered_hooks_once() {
        let ctx = Context::new();
        let hook = Arc::new(CountWakes(AtomicUsize::new(0)));
        let dyn_hook: Arc<dyn Wake> = hook.clone();

        let registration = ctx.register(Arc::downgrade(&dyn_hook));
        ctx.cancel();
        ctx.cancel();
        drop(registration);

        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_registration_is_not_woken() {
        let ctx = Context::new();
        let hook = Arc::new(CountWakes(AtomicUsize::new(0)));
        let dyn_hook: Arc<dyn Wake> = hook.clone();

        drop(ctx.register(Arc::downgrade(&dyn_hook)));
        ctx.cancel();

        assert_eq!(hook.0.load(Ordering::SeqCst), 0);
        assert!(format!("{ctx:?}").contains("waiters: 0"));
    }
}
