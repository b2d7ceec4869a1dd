//! One-shot broadcast signal.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A one-shot, idempotent, broadcast notification.
///
/// Once fired it stays fired. Any number of threads may observe it, block on
/// it, or race it against other signals via [`first_of`](super::first_of).
/// Clones share the same underlying signal.
#[derive(Clone, Default)]
pub struct Signal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Default)]
struct State {
    fired: bool,
    listeners: Vec<(Arc<Latch>, usize)>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A signal that has already fired.
    pub fn fired() -> Self {
        let signal = Self::new();
        signal.fire();
        signal
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        let listeners = {
            let mut state = self.state();
            if state.fired {
                return false;
            }
            state.fired = true;
            std::mem::take(&mut state.listeners)
        };
        self.inner.cond.notify_all();
        for (latch, index) in listeners {
            latch.release(index);
        }
        true
    }

    pub fn is_fired(&self) -> bool {
        self.state().fired
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        let mut state = self.state();
        while !state.fired {
            state = self
                .inner
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the signal fires or `timeout` elapses. Returns whether it fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state();
        while !state.fired {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                // Too far in the future to represent: wait like `wait`.
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return false;
            }
            state = self
                .inner
                .cond
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Whether both handles refer to the same signal.
    pub fn same_as(&self, other: &Signal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register `latch` to be released with `index` when this signal fires.
    /// Returns `false` (and registers nothing) if it already fired.
    pub(super) fn subscribe(&self, latch: &Arc<Latch>, index: usize) -> bool {
        let mut state = self.state();
        if state.fired {
            return false;
        }
        state.listeners.push((Arc::clone(latch), index));
        true
    }

    pub(super) fn unsubscribe(&self, latch: &Arc<Latch>) {
        self.state()
            .listeners
            .retain(|(registered, _)| !Arc::ptr_eq(registered, latch));
    }

    #[cfg(test)]
    pub(super) fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Records which of several signals fired first.
#[derive(Default)]
pub(super) struct Latch {
    winner: Mutex<Option<usize>>,
    cond: Condvar,
}

impl Latch {
    fn release(&self, index: usize) {
        let mut winner = self.winner.lock().unwrap_or_else(PoisonError::into_inner);
        if winner.is_none() {
            *winner = Some(index);
            self.cond.notify_all();
        }
    }

    /// Wait for a release, up to `deadline` if given.
    pub(super) fn wait(&self, deadline: Option<Instant>) -> Option<usize> {
        let mut winner = self.winner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(index) = *winner {
                return Some(index);
            }
            match deadline {
                None => {
                    winner = self
                        .cond
                        .wait(winner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    winner = self
                        .cond
                        .wait_timeout(winner, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fire_is_one_shot_and_idempotent() {
        let signal = Signal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
        assert!(signal.is_fired());
    }

    #[test]
    fn clones_share_state() {
        let signal = Signal::new();
        let clone = signal.clone();
        clone.fire();
        assert!(signal.is_fired());
        assert!(signal.same_as(&clone));
        assert!(!signal.same_as(&Signal::new()));
    }

    #[test]
    fn broadcast_wakes_every_waiter() {
        let signal = Signal::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let s = signal.clone();
                thread::spawn(move || s.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        signal.fire();
        for w in waiters {
            w.join().unwrap();
        }
    }

    #[test]
    fn wait_timeout_reports_outcome() {
        let signal = Signal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(Signal::fired().wait_timeout(Duration::from_secs(3600)));
    }

    #[test]
    fn wait_timeout_huge_duration_still_wakes() {
        let signal = Signal::new();
        let s = signal.clone();
        let waiter = thread::spawn(move || s.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(10));
        signal.fire();
        assert!(waiter.join().unwrap());
    }
}
