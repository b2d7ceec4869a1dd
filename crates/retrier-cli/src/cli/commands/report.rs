//! Summary printed to stderr after `retry run`.

use std::fmt;
use std::time::Duration;

pub struct Report<'a> {
    pub command: &'a [String],
    pub attempts: u32,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "---")?;
        writeln!(f, " command: {}", self.command.join(" "))?;
        writeln!(f, "attempts: {}", self.attempts)?;
        writeln!(f, " elapsed: {:?}", self.elapsed)?;
        match &self.error {
            Some(err) => writeln!(f, "   error: {}", err),
            None => writeln!(f, "  result: success"),
        }
    }
}
