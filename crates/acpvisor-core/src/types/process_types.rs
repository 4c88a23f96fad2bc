//! External command invocation types

use std::collections::HashMap;
use std::path::PathBuf;

/// A command line plus the context it runs in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Applied on top of the inherited environment
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Command line for log output
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Outcome of one external command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// `-1` when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessResult {
    pub fn new(exit_code: i32, stdout_lines: Vec<String>, stderr_lines: Vec<String>) -> Self {
        Self {
            exit_code,
            stdout_lines,
            stderr_lines,
        }
    }

    /// Successful result with the given stdout
    pub fn ok<I, S>(stdout: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(0, stdout.into_iter().map(Into::into).collect(), Vec::new())
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn first_line(&self) -> Option<&str> {
        self.stdout_lines.first().map(String::as_str)
    }
}
