//! Errors returned by the retry loop.

use crate::breaker::BreakerError;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::io;
use std::sync::{Mutex, PoisonError};

/// Why a retry loop ended without success.
pub enum RetryError<E> {
    /// The breaker fired; carries the breaker's own terminal error.
    Interrupted(BreakerError),
    /// The strategies vetoed the very first attempt.
    NoAttempt,
    /// The action or a strategy panicked (`run_isolated` only).
    Panicked(PanicError),
    /// The strategies stopped the loop; carries the last error of the action.
    Failed(E),
    /// The isolated worker thread could not be started.
    Spawn(io::Error),
}

impl<E> RetryError<E> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RetryError::Interrupted(_))
    }

    pub fn is_no_attempt(&self) -> bool {
        matches!(self, RetryError::NoAttempt)
    }

    /// The breaker error, if the loop was interrupted.
    pub fn interruption(&self) -> Option<&BreakerError> {
        match self {
            RetryError::Interrupted(err) => Some(err),
            _ => None,
        }
    }

    /// The recovered panic, if any.
    pub fn panic(&self) -> Option<&PanicError> {
        match self {
            RetryError::Panicked(p) => Some(p),
            _ => None,
        }
    }

    /// The last action error, if the strategies gave up.
    pub fn failure(&self) -> Option<&E> {
        match self {
            RetryError::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_failure(self) -> Option<E> {
        match self {
            RetryError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Interrupted(err) => f.debug_tuple("Interrupted").field(err).finish(),
            RetryError::NoAttempt => f.write_str("NoAttempt"),
            RetryError::Panicked(p) => f.debug_tuple("Panicked").field(p).finish(),
            RetryError::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
            RetryError::Spawn(e) => f.debug_tuple("Spawn").field(e).finish(),
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Interrupted(err) => write!(f, "{}", err),
            RetryError::NoAttempt => write!(f, "{}", NotAttempted),
            RetryError::Panicked(p) => write!(f, "{}", p),
            RetryError::Failed(e) => write!(f, "{}", e),
            RetryError::Spawn(e) => write!(f, "cannot start retry worker: {}", e),
        }
    }
}

impl<E> Error for RetryError<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Interrupted(err) => Some(&**err),
            RetryError::NoAttempt => None,
            RetryError::Panicked(p) => Some(p),
            RetryError::Failed(e) => Some(e),
            RetryError::Spawn(e) => Some(e),
        }
    }
}

/// Stand-in "last error" that strategies see before the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no attempt was made")]
pub struct NotAttempted;

/// Fixed cause behind every [`PanicError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("panic unexpected")]
pub struct Panicked;

/// A recovered panic. Keeps the original payload for inspection.
pub struct PanicError {
    message: String,
    // Behind a mutex so the error stays `Sync`.
    payload: Mutex<Box<dyn Any + Send>>,
}

impl PanicError {
    pub fn new(payload: Box<dyn Any + Send>) -> Self {
        let message = describe_payload(payload.as_ref());
        Self {
            message,
            payload: Mutex::new(payload),
        }
    }

    /// Human-readable rendering of the payload.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the original payload is a `T`.
    pub fn payload_is<T: Any>(&self) -> bool {
        self.payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is::<T>()
    }

    pub fn into_payload(self) -> Box<dyn Any + Send> {
        self.payload.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicError")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", Panicked, self.message)
    }
}

impl Error for PanicError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&Panicked)
    }
}

/// Render common panic payloads, errors included; anything else gets its
/// type-erased placeholder.
fn describe_payload(payload: &(dyn Any + Send)) -> String {
    macro_rules! try_display {
        ($($ty:ty),*) => {
            $(
                if let Some(v) = payload.downcast_ref::<$ty>() {
                    return v.to_string();
                }
            )*
        };
    }
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(err) = payload.downcast_ref::<Box<dyn Error + Send + Sync>>() {
        return err.to_string();
    }
    if let Some(err) = payload.downcast_ref::<Box<dyn Error + Send>>() {
        return err.to_string();
    }
    try_display!(io::Error, anyhow::Error, String, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);
    "Box<dyn Any>".to_string()
}

/// Innermost error of a `source()` chain. A leaf error is its own root cause.
pub fn root_cause<'a>(err: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut cause = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause
}
