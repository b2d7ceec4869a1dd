//! `retry plan` – show the waits a backoff would produce, without running anything.

use anyhow::Result;
use std::io::{self, Write};
use std::time::Duration;

use crate::cli::grammar::{AlgorithmSpec, JitterSpec};

/// Wait before each of `attempts` attempts. The first attempt never waits.
pub fn plan(backoff: &AlgorithmSpec, jitter: Option<&JitterSpec>, attempts: u32) -> Vec<Duration> {
    let algorithm = backoff.build();
    let transformation = jitter.map(JitterSpec::build);
    (0..attempts)
        .map(|attempt| {
            if attempt == 0 {
                return Duration::ZERO;
            }
            let base = algorithm(attempt);
            match &transformation {
                Some(transform) => transform(base),
                None => base,
            }
        })
        .collect()
}

pub fn run_plan(backoff: &AlgorithmSpec, jitter: Option<&JitterSpec>, attempts: u32) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (attempt, wait) in plan(backoff, jitter, attempts).into_iter().enumerate() {
        writeln!(out, "attempt {:>3}  wait {:?}", attempt, wait)?;
    }
    Ok(())
}
