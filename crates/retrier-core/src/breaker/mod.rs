//! Cancellation signals the retry engine races against.
//!
//! A [`Breaker`] is a one-shot broadcast "done" signal plus the terminal error
//! it carries once fired. The engine only observes breakers: it never fires,
//! resets or otherwise mutates them. Sources live in [`source`]: explicit
//! cancellation, deadlines, and multiplexing of several breakers.

mod race;
mod signal;
mod source;

pub use race::{first_of, sleep, Winner};
pub use signal::Signal;
pub use source::{Cancel, Deadline, Multiplex};

use std::error::Error;
use std::sync::Arc;

/// Terminal error of a fired breaker. Shared so every observer sees the same value.
pub type BreakerError = Arc<dyn Error + Send + Sync + 'static>;

/// A cancellation signal with an associated terminal error.
pub trait Breaker: Send + Sync {
    /// Signal that fires once cancellation occurs.
    fn done(&self) -> &Signal;

    /// `None` until [`done`](Breaker::done) fires; afterwards the same error on every call.
    fn err(&self) -> Option<BreakerError>;
}

/// Errors produced by the breakers in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupt {
    /// A bare signal fired without any further explanation.
    #[error("operation interrupted")]
    Interrupted,
    /// Explicitly cancelled.
    #[error("operation canceled")]
    Canceled,
    /// A deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// An OS signal (e.g. Ctrl-C) was received.
    #[error("interrupted by signal")]
    Signal,
}

/// A plain signal is a breaker whose error is [`Interrupt::Interrupted`].
impl Breaker for Signal {
    fn done(&self) -> &Signal {
        self
    }

    fn err(&self) -> Option<BreakerError> {
        self.is_fired()
            .then(|| Arc::new(Interrupt::Interrupted) as BreakerError)
    }
}

impl<B: Breaker + ?Sized> Breaker for Arc<B> {
    fn done(&self) -> &Signal {
        (**self).done()
    }

    fn err(&self) -> Option<BreakerError> {
        (**self).err()
    }
}

impl<B: Breaker + ?Sized> Breaker for &B {
    fn done(&self) -> &Signal {
        (**self).done()
    }

    fn err(&self) -> Option<BreakerError> {
        (**self).err()
    }
}

/// Whether `err` is one of the [`Interrupt`] values.
pub fn interrupt_of(err: &(dyn Error + 'static)) -> Option<Interrupt> {
    err.downcast_ref::<Interrupt>().copied()
}
