//! Backoff algorithms: pure functions from an attempt number to a wait duration.
//!
//! Every algorithm saturates instead of overflowing, so very large attempt
//! numbers yield very long (but valid) durations rather than panicking.

use std::time::Duration;

/// Maps an attempt number to the base wait before that attempt.
pub type Algorithm = Box<dyn Fn(u32) -> Duration + Send + Sync>;

/// `initial + increment * attempt`.
pub fn incremental(initial: Duration, increment: Duration) -> Algorithm {
    Box::new(move |attempt| initial.saturating_add(increment.saturating_mul(attempt)))
}

/// `factor * attempt`.
pub fn linear(factor: Duration) -> Algorithm {
    Box::new(move |attempt| factor.saturating_mul(attempt))
}

/// `factor * base^attempt`. Attempt 0 yields `factor`.
///
/// A negative or non-finite base behaves like 0.
pub fn exponential(factor: Duration, base: f64) -> Algorithm {
    let base = if base.is_finite() && base > 0.0 { base } else { 0.0 };
    Box::new(move |attempt| {
        if attempt == 0 {
            return factor;
        }
        scale_f64(factor, base.powf(f64::from(attempt)))
    })
}

/// `factor * 2^attempt`.
pub fn binary_exponential(factor: Duration) -> Algorithm {
    exponential(factor, 2.0)
}

/// `factor * fib(attempt)`, where `fib(0) = 0` and `fib(1) = 1`.
pub fn fibonacci(factor: Duration) -> Algorithm {
    Box::new(move |attempt| {
        if factor.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }
        match fibonacci_number(attempt) {
            Some(n) => from_nanos_saturating(factor.as_nanos().saturating_mul(n)),
            None => Duration::MAX,
        }
    })
}

/// Nth Fibonacci number, or `None` from `fib(187)` on, where it no longer
/// fits in a `u128`.
pub fn fibonacci_number(n: u32) -> Option<u128> {
    let (mut a, mut b) = (0u128, Some(1u128));
    for _ in 0..n {
        let next = b?;
        b = a.checked_add(next);
        a = next;
    }
    Some(a)
}

/// `d * n` without overflow.
fn scale(d: Duration, n: u64) -> Duration {
    match u32::try_from(n) {
        Ok(small) => d.saturating_mul(small),
        Err(_) => from_nanos_saturating(d.as_nanos().saturating_mul(u128::from(n))),
    }
}

/// `d * x` for a non-negative real factor, saturating at `Duration::MAX`.
fn scale_f64(d: Duration, x: f64) -> Duration {
    if x <= 0.0 || x.is_nan() {
        return Duration::ZERO;
    }
    // Exact for integral factors that fit, which covers the common bases.
    if x.fract() == 0.0 && x < u64::MAX as f64 {
        return scale(d, x as u64);
    }
    Duration::try_from_secs_f64(d.as_secs_f64() * x).unwrap_or(Duration::MAX)
}

fn from_nanos_saturating(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = nanos / NANOS_PER_SEC;
    match u64::try_from(secs) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}
