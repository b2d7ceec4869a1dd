//! Strategies decide, before every attempt, whether the retry loop goes on.
//!
//! A strategy sees the breaker, the zero-based attempt number and the root
//! cause of the last error. Some strategies also wait before answering; those
//! waits always race the breaker, so a fired breaker cuts them short and the
//! strategy answers `false`.

mod classify;

pub use classify::{check_error, network_error, Classified, ErrorHandler, SKIP, STRICT};

use crate::backoff::Algorithm;
use crate::breaker::{self, Breaker};
use crate::jitter::{self, Transformation};
use std::error::Error;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Returns `true` to allow the next attempt, `false` to stop retrying.
pub type Strategy =
    Box<dyn Fn(&dyn Breaker, u32, Option<&(dyn Error + 'static)>) -> bool + Send + Sync>;

/// Strategies in evaluation order; the first `false` vetoes the attempt.
pub type How = Vec<Strategy>;

/// Never stops.
pub fn infinite() -> Strategy {
    Box::new(|_, _, _| true)
}

/// Allows attempts `0..n`.
pub fn limit(n: u32) -> Strategy {
    Box::new(move |_, attempt, _| attempt < n)
}

/// Waits `duration` before the first attempt only.
pub fn delay(duration: Duration) -> Strategy {
    Box::new(move |b, attempt, _| attempt > 0 || breaker::sleep(b, duration))
}

/// Waits before every attempt after the first: `durations[attempt - 1]`,
/// repeating the last one once the list is exhausted. An empty list never waits.
pub fn wait(durations: impl IntoIterator<Item = Duration>) -> Strategy {
    let durations: Vec<Duration> = durations.into_iter().collect();
    Box::new(move |b, attempt, _| {
        if attempt == 0 {
            return true;
        }
        let index = (attempt as usize - 1).min(durations.len().saturating_sub(1));
        match durations.get(index) {
            Some(&duration) => breaker::sleep(b, duration),
            None => true,
        }
    })
}

/// Waits `algorithm(attempt)` before every attempt after the first.
pub fn backoff(algorithm: Algorithm) -> Strategy {
    backoff_with_jitter(algorithm, jitter::identity())
}

/// Waits `transformation(algorithm(attempt))` before every attempt after the first.
pub fn backoff_with_jitter(algorithm: Algorithm, transformation: Transformation) -> Strategy {
    Box::new(move |b, attempt, _| {
        if attempt == 0 {
            return true;
        }
        let duration = transformation(algorithm(attempt));
        tracing::trace!(attempt, ?duration, "backing off");
        breaker::sleep(b, duration)
    })
}

/// Stops once `timeout` has passed since attempt 0 was evaluated.
///
/// The clock restarts whenever attempt 0 is seen again.
pub fn timeout(budget: Duration) -> Strategy {
    let start: Mutex<Option<Instant>> = Mutex::new(None);
    Box::new(move |_, attempt, _| {
        let mut start = start.lock().unwrap_or_else(PoisonError::into_inner);
        if attempt == 0 {
            *start = Some(Instant::now());
            return true;
        }
        match *start {
            Some(started) => started.elapsed() < budget,
            None => {
                *start = Some(Instant::now());
                true
            }
        }
    })
}
