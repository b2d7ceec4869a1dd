//! `retry run -- <command>` – run a command until it exits successfully.

use anyhow::{Context, Result};
use clap::ArgMatches;
use retrier_core::breaker::{Breaker, Cancel, Deadline, Interrupt, Multiplex};
use retrier_core::config::RetrierConfig;
use retrier_core::How;
use std::io;
use std::process::{Child, Command, ExitStatus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::report::Report;
use crate::cli::grammar::{parse_duration, AlgorithmSpec, JitteredBackoff, StrategySpec, WaitList};
use crate::cli::{run_matches_from, RunArgs};

/// How often a running child is checked while waiting for the breaker.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("cannot start `{program}`: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("waiting for `{program}`: {source}")]
    Wait { program: String, source: io::Error },
    #[error("`{program}` {status}")]
    Exit { program: String, status: ExitStatus },
    #[error("`{program}` killed after interruption")]
    Killed { program: String },
}

/// Strategy flags of `retry run`, sorted by their position on the command line.
pub fn strategies_in_order(matches: &ArgMatches) -> Vec<StrategySpec> {
    let mut found: Vec<(usize, StrategySpec)> = Vec::new();
    if matches.get_flag("infinite") {
        let index = matches.index_of("infinite").unwrap_or(0);
        found.push((index, StrategySpec::Infinite));
    }
    collect::<u32>(matches, "limit", StrategySpec::Limit, &mut found);
    collect::<Duration>(matches, "delay", StrategySpec::Delay, &mut found);
    collect::<WaitList>(matches, "wait", |w| StrategySpec::Wait(w.0), &mut found);
    collect::<AlgorithmSpec>(matches, "backoff", StrategySpec::Backoff, &mut found);
    collect::<JitteredBackoff>(
        matches,
        "tbackoff",
        StrategySpec::BackoffWithJitter,
        &mut found,
    );
    found.sort_by_key(|(index, _)| *index);
    found.into_iter().map(|(_, spec)| spec).collect()
}

fn collect<T>(
    matches: &ArgMatches,
    id: &str,
    wrap: impl Fn(T) -> StrategySpec,
    found: &mut Vec<(usize, StrategySpec)>,
) where
    T: Clone + Send + Sync + 'static,
{
    if let (Some(values), Some(indices)) = (matches.get_many::<T>(id), matches.indices_of(id)) {
        found.extend(indices.zip(values.cloned().map(wrap)));
    }
}

/// Strategies stored in the config, in the same flag syntax as the command line.
fn config_strategies(cfg: &RetrierConfig) -> Result<Vec<StrategySpec>> {
    let argv = ["retry", "run"]
        .into_iter()
        .map(String::from)
        .chain(cfg.strategies.iter().cloned())
        .chain(["--".to_string(), "true".to_string()]);
    let matches = run_matches_from(argv).context("invalid strategies in config")?;
    Ok(strategies_in_order(&matches))
}

/// Run the child once. Kills it if the breaker fires while it is running.
fn run_child(argv: &[String], breaker: &dyn Breaker) -> Result<(), CommandError> {
    let program = argv.first().cloned().unwrap_or_default();
    let mut child = Command::new(&program)
        .args(argv.iter().skip(1))
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;
    match supervise(&mut child, breaker) {
        Ok(Some(status)) if status.success() => Ok(()),
        Ok(Some(status)) => Err(CommandError::Exit { program, status }),
        Ok(None) => Err(CommandError::Killed { program }),
        Err(source) => Err(CommandError::Wait { program, source }),
    }
}

/// `Some(status)` once the child exits, `None` if it was killed because the breaker fired.
fn supervise(child: &mut Child, breaker: &dyn Breaker) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if breaker.done().wait_timeout(POLL_INTERVAL) {
            return stop(child);
        }
    }
}

/// Kill the child and reap it. A child that exited on its own before the
/// kill landed keeps its real status.
fn stop(child: &mut Child) -> io::Result<Option<ExitStatus>> {
    if let Some(status) = child.try_wait()? {
        return Ok(Some(status));
    }
    let killed = child.kill().is_ok();
    let status = child.wait()?;
    if !killed || exited_on_its_own(&status) {
        return Ok(Some(status));
    }
    tracing::debug!("killed child {} after interruption", child.id());
    Ok(None)
}

#[cfg(unix)]
fn exited_on_its_own(status: &ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    status.signal().is_none()
}

#[cfg(not(unix))]
fn exited_on_its_own(_status: &ExitStatus) -> bool {
    false
}

pub async fn run_retry(cfg: &RetrierConfig, args: &RunArgs, matches: &ArgMatches) -> Result<()> {
    let timeout = match args.timeout {
        Some(timeout) => timeout,
        None => parse_duration(&cfg.timeout)
            .with_context(|| format!("invalid timeout {:?} in config", cfg.timeout))?,
    };

    let mut specs = strategies_in_order(matches);
    if specs.is_empty() && !cfg.strategies.is_empty() {
        specs = config_strategies(cfg)?;
        tracing::debug!("using strategies from config: {:?}", specs);
    }
    let how: How = specs.iter().map(StrategySpec::build).collect();
    tracing::info!(
        "retrying {:?} with {} strategy flag(s), timeout {:?}",
        args.command,
        how.len(),
        timeout
    );

    let cancel = Cancel::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel_with(Interrupt::Signal);
            }
        }
    });
    let deadline = Deadline::after(timeout).context("start deadline watcher")?;
    let breaker = Multiplex::new(vec![
        Arc::new(deadline) as Arc<dyn Breaker>,
        Arc::new(cancel),
    ])
    .context("start breaker watcher")?;

    let attempts = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let result = tokio::task::spawn_blocking({
        let argv = args.command.clone();
        let attempts = Arc::clone(&attempts);
        move || {
            retrier_core::run_with(
                &breaker,
                |breaker| {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    tracing::debug!("attempt #{} of {:?}", n, argv);
                    run_child(&argv, breaker)
                },
                &how,
            )
        }
    })
    .await
    .context("retry task join")?;

    if cfg.report_enabled() && !args.no_report {
        let report = Report {
            command: &args.command,
            attempts: attempts.load(Ordering::SeqCst),
            elapsed: started.elapsed(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        eprint!("{}", report);
    }

    match &result {
        Ok(()) => tracing::info!("command succeeded"),
        Err(err) => tracing::info!("command failed: {}", err),
    }
    result.context("command did not succeed")
}
