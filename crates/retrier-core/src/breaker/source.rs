//! Breaker sources: explicit cancel, deadline, and multiplex.

use super::race::{first_of, Winner};
use super::{Breaker, BreakerError, Interrupt, Signal};
use std::error::Error;
use std::io;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Explicitly cancellable breaker. Clones share the same state.
#[derive(Clone, Default, Debug)]
pub struct Cancel {
    inner: Arc<CancelInner>,
}

#[derive(Default, Debug)]
struct CancelInner {
    done: Signal,
    reason: OnceLock<BreakerError>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with [`Interrupt::Canceled`].
    pub fn cancel(&self) {
        self.cancel_shared(Arc::new(Interrupt::Canceled));
    }

    /// Cancel with a caller-chosen error. Only the first reason sticks.
    pub fn cancel_with<E>(&self, reason: E)
    where
        E: Error + Send + Sync + 'static,
    {
        self.cancel_shared(Arc::new(reason));
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.done.is_fired()
    }

    fn cancel_shared(&self, reason: BreakerError) {
        // The reason must be visible before the signal is.
        let _ = self.inner.reason.set(reason);
        if self.inner.done.fire() {
            if let Some(reason) = self.inner.reason.get() {
                tracing::debug!("breaker fired: {}", reason);
            }
        }
    }
}

impl Breaker for Cancel {
    fn done(&self) -> &Signal {
        &self.inner.done
    }

    fn err(&self) -> Option<BreakerError> {
        if !self.inner.done.is_fired() {
            return None;
        }
        self.inner.reason.get().cloned()
    }
}

/// Stops a watcher thread once the last handle of its breaker is gone.
#[derive(Debug)]
struct Watcher {
    release: Signal,
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.release.fire();
    }
}

/// Breaker that fires with [`Interrupt::DeadlineExceeded`] once a deadline passes.
#[derive(Clone, Debug)]
pub struct Deadline {
    cancel: Cancel,
    deadline: Option<Instant>,
    _watcher: Option<Arc<Watcher>>,
}

impl Deadline {
    /// Fire after `timeout`. A zero timeout fires immediately.
    pub fn after(timeout: Duration) -> io::Result<Self> {
        let now = Instant::now();
        let deadline = now.checked_add(timeout);
        let cancel = Cancel::new();
        if timeout.is_zero() {
            cancel.cancel_with(Interrupt::DeadlineExceeded);
            return Ok(Self {
                cancel,
                deadline,
                _watcher: None,
            });
        }

        let release = Signal::new();
        let watch_release = release.clone();
        let watch_cancel = cancel.clone();
        thread::Builder::new()
            .name("retrier-deadline".into())
            .spawn(move || {
                if first_of(&[&watch_release], Some(timeout)) == Winner::Timeout {
                    watch_cancel.cancel_with(Interrupt::DeadlineExceeded);
                }
            })?;
        Ok(Self {
            cancel,
            deadline,
            _watcher: Some(Arc::new(Watcher { release })),
        })
    }

    /// Fire at `deadline`. A deadline in the past fires immediately.
    pub fn at(deadline: Instant) -> io::Result<Self> {
        Self::after(deadline.saturating_duration_since(Instant::now()))
    }

    /// When this breaker fires. `None` if the timeout is too far out to be
    /// represented as an `Instant`; such a deadline never fires.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Breaker for Deadline {
    fn done(&self) -> &Signal {
        self.cancel.done()
    }

    fn err(&self) -> Option<BreakerError> {
        self.cancel.err()
    }
}

/// Breaker that fires as soon as any of its members fires, adopting that
/// member's error. An empty set fires immediately.
#[derive(Clone)]
pub struct Multiplex {
    cancel: Cancel,
    _watcher: Option<Arc<Watcher>>,
}

impl Multiplex {
    pub fn new(breakers: Vec<Arc<dyn Breaker>>) -> io::Result<Self> {
        let cancel = Cancel::new();
        if breakers.is_empty() {
            cancel.cancel_with(Interrupt::Interrupted);
            return Ok(Self {
                cancel,
                _watcher: None,
            });
        }

        let release = Signal::new();
        let watch_release = release.clone();
        let watch_cancel = cancel.clone();
        thread::Builder::new()
            .name("retrier-multiplex".into())
            .spawn(move || {
                let mut signals: Vec<&Signal> = breakers.iter().map(|b| b.done()).collect();
                signals.push(&watch_release);
                if let Winner::Signal(index) = first_of(&signals, None) {
                    if let Some(breaker) = breakers.get(index) {
                        let reason = breaker
                            .err()
                            .unwrap_or_else(|| Arc::new(Interrupt::Interrupted));
                        watch_cancel.cancel_shared(reason);
                    }
                }
            })?;
        Ok(Self {
            cancel,
            _watcher: Some(Arc::new(Watcher { release })),
        })
    }
}

impl Breaker for Multiplex {
    fn done(&self) -> &Signal {
        self.cancel.done()
    }

    fn err(&self) -> Option<BreakerError> {
        self.cancel.err()
    }
}
