//! One-shot completion signals.
//!
//! A [`Signal`] stands in for the semaphore or fence a caller hands to
//! acquisition. The delivery path completes it once the surface has a
//! drawable ready; the caller may poll it or block on it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use surfacechain_core::Timeout;

#[derive(Default)]
struct SignalInner {
    signaled: Mutex<bool>,
    cond: Condvar,
}

/// Cloneable completion flag shared between a waiter and the delivery path.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Create an unsignaled signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the signal has fired.
    #[must_use]
    pub fn is_signaled(&self) -> bool {
        *self.inner.signaled.lock()
    }

    /// Block until the signal fires or the timeout elapses.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait(&self, timeout: Timeout) -> bool {
        let deadline = timeout.deadline(Instant::now());
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            match deadline {
                None => self.inner.cond.wait(&mut signaled),
                Some(deadline) => {
                    if self
                        .inner
                        .cond
                        .wait_until(&mut signaled, deadline)
                        .timed_out()
                    {
                        return *signaled;
                    }
                }
            }
        }
        true
    }

    /// Return the signal to the unsignaled state so it can be reused.
    pub fn reset(&self) {
        *self.inner.signaled.lock() = false;
    }

    /// Fire the signal and wake every waiter.
    pub(crate) fn signal(&self) {
        let mut signaled = self.inner.signaled.lock();
        *signaled = true;
        self.inner.cond.notify_all();
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}
