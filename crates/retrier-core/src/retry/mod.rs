//! Retry execution core.
//!
//! [`run`] drives the loop on the calling thread: evaluate every strategy,
//! check the breaker, invoke the action, repeat. [`run_isolated`] runs the same
//! loop on a worker thread, turns panics into errors and returns as soon as the
//! breaker fires, abandoning (never killing) the worker.

mod error;
mod isolate;
mod run;

pub use error::{root_cause, NotAttempted, PanicError, Panicked, RetryError};
pub use isolate::run_isolated;
pub use run::{run, run_with};
