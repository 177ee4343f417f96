//! One-shot broadcast used to publish the end of an in-flight lookup.
//!
//! [`channel`] splits the signal in two halves:
//!
//! - a single [`Notifier`], owned by the caller performing the lookup.  It is
//!   not `Clone`, and firing consumes it, so the signal can fire at most once.
//!   Dropping it fires as well, so a lookup that unwinds still releases its
//!   waiters.
//! - any number of [`Listener`]s, held by the cache entry and by every caller
//!   joining the lookup.  Listeners can only observe the signal.
//!
//! A listener blocked in [`Listener::wait`] is additionally woken by its
//! [`Context`] when the context is canceled.  That wake-up only makes the
//! waiter re-check its context; it never marks the signal as fired.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::context::Context;
use crate::error::ContextError;

/// Something a [`Context`] can nudge when it gets canceled.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

struct Shared {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Wake for Shared {
    fn wake(&self) {
        // Taking the lock orders this wake-up after a waiter's last check of
        // its context, so the notification cannot be lost.
        let _fired = self.fired.lock();
        self.cond.notify_all();
    }
}

/// Creates a fresh, unfired signal.
pub(crate) fn channel() -> (Notifier, Listener) {
    let shared = Arc::new(Shared {
        fired: Mutex::new(false),
        cond: Condvar::new(),
    });
    (
        Notifier {
            shared: Arc::clone(&shared),
        },
        Listener { shared },
    )
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// The firing half.  Exactly one exists per signal.
pub(crate) struct Notifier {
    shared: Arc<Shared>,
}

impl Notifier {
    /// Fires the signal, waking every current and future waiter.
    pub(crate) fn notify(self) {
        // The work happens in `Drop`.
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        let mut fired = self.shared.fired.lock();
        *fired = true;
        self.shared.cond.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// The observing half.  Cheap to clone.
#[derive(Clone)]
pub(crate) struct Listener {
    shared: Arc<Shared>,
}

impl Listener {
    #[cfg(test)]
    pub(crate) fn is_notified(&self) -> bool {
        *self.shared.fired.lock()
    }

    /// Returns `true` if both listeners observe the same signal.
    pub(crate) fn same_signal(&self, other: &Listener) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Blocks until the signal fires or `ctx` is done, whichever comes first.
    ///
    /// A signal that already fired returns `Ok` even if `ctx` is done too.
    pub(crate) fn wait(&self, ctx: &Context) -> Result<(), ContextError> {
        let shared: Arc<dyn Wake> = self.shared.clone();
        let _registration = ctx.register(Arc::downgrade(&shared));

        let mut fired = self.shared.fired.lock();
        loop {
            if *fired {
                return Ok(());
            }
            if let Some(err) = ctx.err() {
                return Err(err);
            }
            match ctx.deadline() {
                Some(deadline) => {
                    self.shared.cond.wait_until(&mut fired, deadline);
                }
                None => self.shared.cond.wait(&mut fired),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn notify_wakes_all_waiters() {
        let (notifier, listener) = channel();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let listener = listener.clone();
                thread::spawn(move || listener.wait(&Context::new()))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(!listener.is_notified());
        notifier.notify();

        for h in handles {
            assert_eq!(h.join().unwrap(), Ok(()));
        }
        assert!(listener.is_notified());
    }

    #[test]
    fn dropping_notifier_fires() {
        let (notifier, listener) = channel();
        drop(notifier);
        assert!(listener.is_notified());
        assert_eq!(listener.wait(&Context::new()), Ok(()));
    }

    #[test]
    fn fired_signal_wins_over_done_context() {
        let (notifier, listener) = channel();
        notifier.notify();
        let ctx = Context::new();
        ctx.cancel();
        assert_eq!(listener.wait(&ctx), Ok(()));
    }

    #[test]
    fn cancel_unblocks_waiter_without_firing() {
        let (_notifier, listener) = channel();
        let ctx = Context::new();

        let waiter = {
            let listener = listener.clone();
            let ctx = ctx.clone();
            thread::spawn(move || listener.wait(&ctx))
        };

        thread::sleep(Duration::from_millis(20));
        ctx.cancel();

        assert_eq!(waiter.join().unwrap(), Err(ContextError::Canceled));
        assert!(!listener.is_notified(), "a canceled waiter must not fire the signal");
    }

    #[test]
    fn deadline_unblocks_waiter() {
        let (_notifier, listener) = channel();
        let start = Instant::now();
        let ctx = Context::with_timeout(Duration::from_millis(30));

        assert_eq!(listener.wait(&ctx), Err(ContextError::DeadlineExceeded));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!listener.is_notified());
    }

    #[test]
    fn same_signal_compares_identity() {
        let (_n1, a) = channel();
        let (_n2, b) = channel();
        assert!(a.same_signal(&a.clone()));
        assert!(!a.same_signal(&b));
    }
}
