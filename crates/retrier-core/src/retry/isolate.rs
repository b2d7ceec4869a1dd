use super::error::{PanicError, RetryError};
use super::run::{interruption, run};
use crate::breaker::{first_of, Breaker, Signal, Winner};
use crate::strategy::How;
use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

type Slot<E> = Arc<Mutex<Option<Result<(), RetryError<E>>>>>;

/// Like [`run`], but on a dedicated worker thread.
///
/// A panic in the action or in a strategy ends the loop: a payload of type `E`
/// comes back as [`RetryError::Failed`] unchanged, anything else as
/// [`RetryError::Panicked`]. If the breaker fires before the worker is done,
/// its error is returned at once and the worker is left to finish on its own.
pub fn run_isolated<B, F, E>(breaker: B, action: F, how: How) -> Result<(), RetryError<E>>
where
    B: Breaker + Clone + 'static,
    F: FnMut() -> Result<(), E> + Send + 'static,
    E: Error + Send + 'static,
{
    let slot: Slot<E> = Arc::new(Mutex::new(None));
    let finished = Signal::new();

    let worker_breaker = breaker.clone();
    let worker_slot = Arc::clone(&slot);
    let worker_finished = finished.clone();
    thread::Builder::new()
        .name("retrier-worker".into())
        .spawn(move || {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| run(&worker_breaker, action, &how)));
            let result = outcome.unwrap_or_else(|payload| Err(recover(payload)));
            *worker_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
            worker_finished.fire();
        })
        .map_err(RetryError::Spawn)?;

    // Breaker first: if both have fired, the interruption wins.
    match first_of(&[breaker.done(), &finished], None) {
        Winner::Signal(0) => {
            let err = interruption(&breaker);
            tracing::debug!("abandoning retry worker: {}", err);
            Err(RetryError::Interrupted(err))
        }
        _ => slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            // `finished` fires only after the slot is filled.
            .unwrap_or_else(|| Err(RetryError::Interrupted(interruption(&breaker)))),
    }
}

fn recover<E>(payload: Box<dyn Any + Send>) -> RetryError<E>
where
    E: Error + 'static,
{
    match payload.downcast::<E>() {
        Ok(err) => {
            tracing::debug!("recovered panic carrying the action error: {}", err);
            RetryError::Failed(*err)
        }
        Err(payload) => {
            let panic = PanicError::new(payload);
            tracing::debug!("recovered panic: {}", panic.message());
            RetryError::Panicked(panic)
        }
    }
}
