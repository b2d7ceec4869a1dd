//! CLI command handlers. Each command is in its own file.

mod completion;
mod plan;
mod report;
mod run;

pub use completion::run_completion;
pub use plan::run_plan;
pub use run::run_retry;
