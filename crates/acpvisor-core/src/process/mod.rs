//! External process execution
//!
//! This module provides:
//! - `ProcessRunner` for short-lived commands and long-lived spawns
//! - Supervision handles for running agent processes (graceful stop, exit observation)

mod handle;
mod runner;

pub use handle::{
    supervise, terminate, AgentProcess, AgentStdio, ExitOutcome, ProcessWatcher,
    DEFAULT_STOP_GRACE,
};
pub use runner::{ProcessRunner, TokioProcessRunner, DEFAULT_COMMAND_TIMEOUT};

#[cfg(test)]
pub use runner::MockProcessRunner;
