//! Error-driven strategies (experimental).
//!
//! `check_error` lets the last error veto another attempt. An error can carry
//! its own verdict by being a [`Classified`]; otherwise every handler must
//! agree that it is worth retrying.

use super::Strategy;
use std::error::Error;
use std::fmt;
use std::io;

/// Handler verdict for errors it does not recognise: keep retrying.
pub const SKIP: bool = true;
/// Handler verdict for errors it does not recognise: stop.
pub const STRICT: bool = false;

/// Decides whether an error is worth another attempt.
pub type ErrorHandler = Box<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// An error that states whether it is retriable.
///
/// Strategies see the root cause of an error, so the verdict is attached to
/// the leaf: `Classified` reports no further `source()`.
#[derive(Debug)]
pub struct Classified {
    inner: Box<dyn Error + Send + Sync>,
    retriable: bool,
}

impl Classified {
    pub fn retriable(inner: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            inner: inner.into(),
            retriable: true,
        }
    }

    pub fn permanent(inner: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            inner: inner.into(),
            retriable: false,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retriable
    }

    pub fn inner(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    pub fn into_inner(self) -> Box<dyn Error + Send + Sync> {
        self.inner
    }
}

impl fmt::Display for Classified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl Error for Classified {}

/// Strategy that consults the last error.
///
/// No error means go on. A [`Classified`] error decides alone. Anything else
/// must be approved by every handler.
pub fn check_error(handlers: Vec<ErrorHandler>) -> Strategy {
    Box::new(move |_, attempt, err| {
        let Some(err) = err else {
            return true;
        };
        if let Some(classified) = err.downcast_ref::<Classified>() {
            return classified.is_retriable();
        }
        let verdict = handlers.iter().all(|handle| handle(err));
        if !verdict {
            tracing::debug!(attempt, "error vetoed retry: {}", err);
        }
        verdict
    })
}

/// Handler for network failures: timeouts and transient conditions are
/// retriable, other network failures are not, and errors that are not
/// network I/O errors get `defaults`.
pub fn network_error(defaults: bool) -> ErrorHandler {
    Box::new(move |err| match err.downcast_ref::<io::Error>() {
        Some(io_err) => classify_io_kind(io_err.kind()).unwrap_or(defaults),
        None => defaults,
    })
}

/// `Some(retriable)` for network error kinds, `None` for everything else.
fn classify_io_kind(kind: io::ErrorKind) -> Option<bool> {
    use io::ErrorKind::*;
    match kind {
        TimedOut | WouldBlock | Interrupted | ConnectionReset | ConnectionAborted => Some(true),
        ConnectionRefused | NotConnected | AddrInUse | AddrNotAvailable | BrokenPipe => Some(false),
        _ => None,
    }
}
