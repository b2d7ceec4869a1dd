pub mod config;
pub mod logging;

// Retry engine
pub mod backoff;
pub mod breaker;
pub mod jitter;
pub mod retry;
pub mod strategy;

pub use breaker::{Breaker, BreakerError, Signal};
pub use retry::{run, run_isolated, run_with, RetryError};
pub use strategy::{How, Strategy};
