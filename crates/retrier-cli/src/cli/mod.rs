//! CLI for the retrier tool.

mod commands;
pub mod grammar;

use anyhow::{Context, Result};
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use clap_complete::Shell;
use retrier_core::config::{self, RetrierConfig};
use std::path::PathBuf;
use std::time::Duration;

use commands::{run_completion, run_plan, run_retry};
use grammar::{parse_duration, AlgorithmSpec, JitterSpec, JitteredBackoff, WaitList};

/// Top-level CLI for the retrier tool.
#[derive(Debug, Parser)]
#[command(name = "retry")]
#[command(about = "retry: run a command again until it succeeds", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/retrier/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a command, retrying it according to the strategy flags.
    Run(RunArgs),

    /// Print the wait before each attempt for a backoff algorithm.
    Plan {
        /// Backoff algorithm, e.g. "exp[100ms,2]".
        #[arg(long, value_name = "ALGORITHM")]
        backoff: AlgorithmSpec,
        /// Jitter transformation applied to every wait, e.g. "full".
        #[arg(long, value_name = "TRANSFORMATION")]
        jitter: Option<JitterSpec>,
        /// Number of attempts to show.
        #[arg(long, default_value = "5", value_name = "N")]
        attempts: u32,
    },

    /// Print a shell completion script.
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Strategy flags apply in the order they are given. Each may be repeated.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Give up after this long (default from config, "1m").
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub timeout: Option<Duration>,

    /// Never stop repeating (until the timeout or Ctrl-C).
    #[arg(long)]
    pub infinite: bool,

    /// Make at most N attempts.
    #[arg(long, value_name = "N")]
    pub limit: Vec<u32>,

    /// Wait before the first attempt.
    #[arg(long, value_parser = parse_duration, value_name = "DURATION")]
    pub delay: Vec<Duration>,

    /// Wait before each later attempt; the last duration repeats.
    #[arg(long, value_name = "DURATION,...")]
    pub wait: Vec<WaitList>,

    /// Wait before each later attempt as given by a backoff algorithm.
    #[arg(long, value_name = "ALGORITHM")]
    pub backoff: Vec<AlgorithmSpec>,

    /// Backoff with jitter, e.g. "lin[10s] full".
    #[arg(long, value_name = "ALGORITHM TRANSFORMATION")]
    pub tbackoff: Vec<JitteredBackoff>,

    /// Do not print the report to stderr.
    #[arg(long)]
    pub no_report: bool,

    /// Command to run, after `--`.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let matches = Cli::command().get_matches();
        let cli = Cli::from_arg_matches(&matches)?;
        let cfg = load_config(cli.config.as_deref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run(args) => {
                let run_matches = matches
                    .subcommand_matches("run")
                    .context("missing run arguments")?;
                run_retry(&cfg, &args, run_matches).await?;
            }
            CliCommand::Plan {
                backoff,
                jitter,
                attempts,
            } => run_plan(&backoff, jitter.as_ref(), attempts)?,
            CliCommand::Completion { shell } => run_completion(shell),
        }

        Ok(())
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<RetrierConfig> {
    match path {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

/// Matches of `retry run` for `argv`; used for strategies stored in the config.
pub(crate) fn run_matches_from<I, T>(argv: I) -> Result<ArgMatches>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let mut matches = Cli::command().try_get_matches_from(argv)?;
    matches
        .remove_subcommand()
        .filter(|(name, _)| name == "run")
        .map(|(_, m)| m)
        .context("expected `run` arguments")
}

#[cfg(test)]
mod tests;
