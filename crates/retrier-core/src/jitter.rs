//! Jitter transformations: randomized post-processing of a backoff duration.
//!
//! Each constructor takes the generator it draws from. Passing `None` seeds a
//! fresh generator from the OS, so a transformation is always usable.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Perturbs a computed duration.
pub type Transformation = Box<dyn Fn(Duration) -> Duration + Send + Sync>;

/// Leaves the duration unchanged.
pub fn identity() -> Transformation {
    Box::new(|duration| duration)
}

/// Uniformly random duration in `[0, d)`.
///
/// See <https://www.awsarchitectureblog.com/2015/03/backoff.html>.
pub fn full(generator: Option<StdRng>) -> Transformation {
    let rng = Source::new(generator);
    Box::new(move |duration| {
        let n = nanos(duration);
        if n == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rng.with(|r| r.random_range(0..n)))
    })
}

/// Uniformly random duration in `[d/2, d)`.
pub fn equal(generator: Option<StdRng>) -> Transformation {
    let rng = Source::new(generator);
    Box::new(move |duration| {
        let half = nanos(duration) / 2;
        if half == 0 {
            return Duration::from_nanos(half);
        }
        Duration::from_nanos(half + rng.with(|r| r.random_range(0..half)))
    })
}

/// Deviates from `d` by up to `factor` of it in either direction:
/// uniformly random in `[d * (1 - factor), d * (1 + factor))`, floored at zero.
pub fn deviation(generator: Option<StdRng>, factor: f64) -> Transformation {
    let rng = Source::new(generator);
    Box::new(move |duration| {
        let n = nanos(duration) as f64;
        let min = n - n * factor;
        let max = n + n * factor;
        let u: f64 = rng.with(|r| r.random());
        from_nanos_f64(min + u * (max - min))
    })
}

/// Adds a normally distributed offset with the given standard deviation.
///
/// The raw result can be negative; it is clamped to zero.
pub fn normal_distribution(generator: Option<StdRng>, std_dev: Duration) -> Transformation {
    let rng = Source::new(generator);
    let sigma = nanos(std_dev) as f64;
    Box::new(move |duration| {
        let z = rng.with(standard_normal);
        from_nanos_f64(nanos(duration) as f64 + z * sigma)
    })
}

/// Box-Muller sample from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    // 1 - [0, 1) keeps u1 away from ln(0).
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Generator shared by every call of one transformation.
struct Source(Mutex<StdRng>);

impl Source {
    fn new(generator: Option<StdRng>) -> Self {
        Self(Mutex::new(generator.unwrap_or_else(StdRng::from_os_rng)))
    }

    fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

fn from_nanos_f64(n: f64) -> Duration {
    if n.is_nan() || n <= 0.0 {
        Duration::ZERO
    } else if n >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D: Duration = Duration::from_millis(1);

    fn seeded() -> Option<StdRng> {
        Some(StdRng::seed_from_u64(0))
    }

    #[test]
    fn identity_is_noop() {
        assert_eq!(identity()(D), D);
    }

    #[test]
    fn full_stays_below_input() {
        let t = full(seeded());
        for _ in 0..1000 {
            assert!(t(D) < D);
        }
        assert_eq!(t(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn equal_stays_in_upper_half() {
        let t = equal(seeded());
        for _ in 0..1000 {
            let d = t(D);
            assert!(d >= D / 2 && d < D, "{:?}", d);
        }
        assert_eq!(t(Duration::from_nanos(1)), Duration::ZERO);
    }

    #[test]
    fn deviation_stays_within_factor() {
        let t = deviation(seeded(), 0.5);
        for _ in 0..1000 {
            let d = t(D);
            assert!(d >= D / 2 && d < D * 3 / 2, "{:?}", d);
        }
    }

    #[test]
    fn deviation_larger_than_one_is_floored() {
        let t = deviation(seeded(), 3.0);
        for _ in 0..1000 {
            assert!(t(D) < D * 4);
        }
    }

    #[test]
    fn normal_distribution_never_negative() {
        let t = normal_distribution(seeded(), Duration::from_secs(10));
        let mut saw_zero = false;
        for _ in 0..1000 {
            if t(D) == Duration::ZERO {
                saw_zero = true;
            }
        }
        assert!(saw_zero, "a wide deviation must clamp some samples to zero");
    }

    #[test]
    fn normal_distribution_centers_on_input() {
        let t = normal_distribution(seeded(), D / 10);
        let samples = 10_000u32;
        let total: Duration = (0..samples).map(|_| t(D)).sum();
        let mean = total / samples;
        assert!(mean > D * 95 / 100 && mean < D * 105 / 100, "{:?}", mean);
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = full(seeded());
        let b = full(seeded());
        for _ in 0..16 {
            assert_eq!(a(D), b(D));
        }
    }

    #[test]
    fn missing_generator_gets_default() {
        let transformations = [
            full(None),
            equal(None),
            deviation(None, 0.5),
            normal_distribution(None, D / 2),
        ];
        for t in &transformations {
            // Any value is fine; it must not panic and must vary.
            let first = t(D);
            assert!((0..64).any(|_| t(D) != first));
        }
    }
}
