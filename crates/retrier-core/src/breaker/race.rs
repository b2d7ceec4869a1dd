//! Wait for the first of several signals, optionally bounded by a timeout.
//!
//! This is the only blocking primitive the engine uses: strategies race a
//! timeout against the breaker, and `run_isolated` races the breaker against
//! worker completion. No thread or timer outlives the call.

use super::signal::{Latch, Signal};
use super::Breaker;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of [`first_of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The signal at this index fired first (or had already fired).
    Signal(usize),
    /// The timeout elapsed before any signal fired.
    Timeout,
}

/// Block until one of `signals` fires or `timeout` elapses.
///
/// Signals that have already fired win immediately, lowest index first.
/// With no signals and no timeout there is nothing to wait for and the call
/// returns [`Winner::Timeout`] at once.
pub fn first_of(signals: &[&Signal], timeout: Option<Duration>) -> Winner {
    if signals.is_empty() && timeout.is_none() {
        return Winner::Timeout;
    }
    // A timeout too large for the clock behaves like no timeout.
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

    let mut registration = Registration {
        latch: Arc::new(Latch::default()),
        signals: Vec::with_capacity(signals.len()),
    };
    for (index, &signal) in signals.iter().enumerate() {
        if !signal.subscribe(&registration.latch, index) {
            return Winner::Signal(index);
        }
        registration.signals.push(signal);
    }
    match registration.latch.wait(deadline) {
        Some(index) => Winner::Signal(index),
        None => Winner::Timeout,
    }
}

/// Cancellable sleep: `true` if `duration` elapsed, `false` if the breaker
/// fired first. An already fired breaker returns `false` without waiting.
pub fn sleep(breaker: &dyn Breaker, duration: Duration) -> bool {
    match first_of(&[breaker.done()], Some(duration)) {
        Winner::Timeout => true,
        Winner::Signal(_) => false,
    }
}

/// Listener registrations of one race; removed on every exit path.
struct Registration<'a> {
    latch: Arc<Latch>,
    signals: Vec<&'a Signal>,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        for signal in &self.signals {
            signal.unsubscribe(&self.latch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn already_fired_wins_without_waiting() {
        let a = Signal::new();
        let b = Signal::fired();
        let start = Instant::now();
        assert_eq!(first_of(&[&a, &b], Some(Duration::from_secs(3600))), Winner::Signal(1));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(a.listener_count(), 0);
    }

    #[test]
    fn lowest_fired_index_wins() {
        let a = Signal::fired();
        let b = Signal::fired();
        assert_eq!(first_of(&[&a, &b], None), Winner::Signal(0));
    }

    #[test]
    fn timeout_wins_when_nothing_fires() {
        let a = Signal::new();
        let start = Instant::now();
        assert_eq!(first_of(&[&a], Some(Duration::from_millis(20))), Winner::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(a.listener_count(), 0, "registration must be removed");
    }

    #[test]
    fn later_fire_wakes_the_race() {
        let a = Signal::new();
        let b = Signal::new();
        let b2 = b.clone();
        let firer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            b2.fire();
        });
        assert_eq!(first_of(&[&a, &b], Some(Duration::from_secs(3600))), Winner::Signal(1));
        firer.join().unwrap();
        assert_eq!(a.listener_count(), 0);
    }

    #[test]
    fn empty_race_returns_immediately() {
        assert_eq!(first_of(&[], None), Winner::Timeout);
        assert_eq!(first_of(&[], Some(Duration::ZERO)), Winner::Timeout);
    }

    #[test]
    fn sleep_is_interruptible() {
        let breaker = Signal::fired();
        let start = Instant::now();
        assert!(!sleep(&breaker, Duration::from_secs(3600)));
        assert!(start.elapsed() < Duration::from_secs(1));

        let open = Signal::new();
        assert!(sleep(&open, Duration::from_millis(5)));
        assert!(sleep(&open, Duration::ZERO));
        assert_eq!(open.listener_count(), 0);
    }

    #[test]
    fn registration_removed_when_race_unwinds() {
        let a = Signal::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut registration = Registration {
                latch: Arc::new(Latch::default()),
                signals: Vec::new(),
            };
            assert!(a.subscribe(&registration.latch, 0));
            registration.signals.push(&a);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(a.listener_count(), 0);
    }
}
