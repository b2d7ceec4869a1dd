//! Instrumented actions for scenario tests.
//!
//! A [`Flaky`] action fails a configurable number of times before succeeding
//! and counts every invocation, so tests can assert "at most one call per
//! attempt" from the outside.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Flaky {
    calls: Arc<AtomicU32>,
    failures: u32,
}

impl Flaky {
    /// Fails `failures` times, then succeeds forever.
    pub fn failing(failures: u32) -> Self {
        Self {
            calls: Arc::default(),
            failures,
        }
    }

    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The action: error `n` is "failure n" (1-based).
    pub fn action(&self) -> impl FnMut() -> Result<(), io::Error> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let failures = self.failures;
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures {
                Err(io::Error::other(format!("failure {}", n)))
            } else {
                Ok(())
            }
        }
    }
}
