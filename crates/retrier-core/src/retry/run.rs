use super::error::{root_cause, NotAttempted, RetryError};
use crate::breaker::{Breaker, BreakerError, Interrupt};
use crate::strategy::Strategy;
use std::error::Error;
use std::sync::Arc;

/// Runs `action` until it succeeds, a strategy vetoes the next attempt, or the
/// breaker fires.
///
/// Every iteration evaluates `how` left to right (stopping at the first
/// `false`), then checks the breaker, then invokes the action if all
/// strategies agreed. Strategies see the root cause of the last error, or
/// [`NotAttempted`] before the first attempt. The attempt counter advances
/// once per iteration whether or not the action ran.
///
/// The breaker is only observed between attempts: an action already running
/// when it fires is not preempted. Actions that need to notice cancellation
/// should use [`run_with`], which hands them the breaker.
pub fn run<F, E>(breaker: &dyn Breaker, mut action: F, how: &[Strategy]) -> Result<(), RetryError<E>>
where
    F: FnMut() -> Result<(), E>,
    E: Error + 'static,
{
    run_with(breaker, |_| action(), how)
}

/// Like [`run`], but every attempt receives the breaker so a long-running
/// action can watch it and give up early.
pub fn run_with<F, E>(
    breaker: &dyn Breaker,
    mut action: F,
    how: &[Strategy],
) -> Result<(), RetryError<E>>
where
    F: FnMut(&dyn Breaker) -> Result<(), E>,
    E: Error + 'static,
{
    let mut last: Option<E> = None;
    let mut attempt: u32 = 0;
    let mut should = true;

    while should {
        {
            let cause: &(dyn Error + 'static) = match &last {
                Some(err) => root_cause(err),
                None => &NotAttempted,
            };
            should = how.iter().all(|strategy| strategy(breaker, attempt, Some(cause)));
            tracing::trace!(attempt, should, "strategies evaluated");
        }

        if breaker.done().is_fired() {
            let err = interruption(breaker);
            tracing::debug!(attempt, "retry interrupted: {}", err);
            return Err(RetryError::Interrupted(err));
        }

        if should {
            tracing::debug!(attempt, "attempt started");
            match action(breaker) {
                Ok(()) => {
                    tracing::debug!(attempt, "attempt succeeded");
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(attempt, "attempt failed: {}", err);
                    last = Some(err);
                }
            }
        }
        attempt = attempt.saturating_add(1);
    }

    match last {
        Some(err) => Err(RetryError::Failed(err)),
        None => Err(RetryError::NoAttempt),
    }
}

/// The breaker's own error, or the generic sentinel for breakers without one.
pub(super) fn interruption(breaker: &dyn Breaker) -> BreakerError {
    breaker
        .err()
        .unwrap_or_else(|| Arc::new(Interrupt::Interrupted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{interrupt_of, Signal};
    use crate::strategy::{infinite, limit};
    use std::cell::Cell;
    use std::io;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("attempt {0} failed")]
    struct Failure(u32);

    #[derive(Debug, thiserror::Error)]
    #[error("request failed")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn returns_last_error_when_limit_reached() {
        let calls = Cell::new(0);
        let result = run(
            &Signal::new(),
            || {
                calls.set(calls.get() + 1);
                Err(Failure(calls.get()))
            },
            &[limit(3)],
        );
        assert_eq!(calls.get(), 3);
        match result {
            Err(RetryError::Failed(Failure(n))) => assert_eq!(n, 3),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn stops_on_first_success() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<Failure>> = run(
            &Signal::new(),
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 2 {
                    Err(Failure(calls.get()))
                } else {
                    Ok(())
                }
            },
            &[infinite()],
        );
        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn vetoed_first_attempt_is_no_attempt() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<Failure>> = run(
            &Signal::new(),
            || {
                calls.set(calls.get() + 1);
                Ok(())
            },
            &[limit(0)],
        );
        assert!(result.unwrap_err().is_no_attempt());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn fired_breaker_wins_over_strategies() {
        let calls = Cell::new(0);
        let result: Result<(), RetryError<Failure>> = run(
            &Signal::fired(),
            || {
                calls.set(calls.get() + 1);
                Ok(())
            },
            &[infinite()],
        );
        let err = result.unwrap_err();
        let interruption = err.interruption().expect("interrupted");
        assert_eq!(interrupt_of(interruption.as_ref()), Some(Interrupt::Interrupted));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn strategies_short_circuit() {
        let evaluated = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&evaluated);
        let counting: Strategy = Box::new(move |_, _, _| {
            *counter.lock().unwrap() += 1;
            true
        });
        let result: Result<(), RetryError<Failure>> =
            run(&Signal::new(), || Ok(()), &[limit(0), counting]);
        assert!(result.is_err());
        assert_eq!(*evaluated.lock().unwrap(), 0);
    }

    #[test]
    fn strategies_see_root_cause_and_sentinel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let recording: Strategy = Box::new(move |_, attempt, err| {
            let err = err.expect("strategies always get an error");
            let label = if err.is::<NotAttempted>() {
                "not attempted".to_string()
            } else if err.is::<io::Error>() {
                format!("io: {}", err)
            } else {
                format!("other: {}", err)
            };
            record.lock().unwrap().push((attempt, label));
            true
        });
        let result = run(
            &Signal::new(),
            || Err(Wrapper(io::Error::from(io::ErrorKind::TimedOut))),
            &[recording, limit(2)],
        );
        assert!(result.unwrap_err().failure().is_some());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, "not attempted".to_string()));
        assert!(seen[1].1.starts_with("io: "));
        assert_eq!(seen[2].0, 2);
    }

    #[test]
    fn action_sees_the_breaker() {
        let breaker = Signal::new();
        let calls = Cell::new(0);
        let result: Result<(), RetryError<Failure>> = run_with(
            &breaker,
            |b| {
                calls.set(calls.get() + 1);
                // The action stops the loop itself through the breaker it was given.
                assert!(b.err().is_none());
                b.done().fire();
                Err(Failure(calls.get()))
            },
            &[infinite()],
        );
        assert!(result.unwrap_err().is_interrupted());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn returned_error_keeps_wrapper() {
        let result = run(
            &Signal::new(),
            || Err(Wrapper(io::Error::other("down"))),
            &[limit(1)],
        );
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "request failed");
        assert!(err.into_failure().is_some());
    }
}
