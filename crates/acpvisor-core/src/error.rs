//! Error types for acpvisor core

use std::time::Duration;
use thiserror::Error;

/// Main error type for acpvisor operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures to run an external command.
///
/// A non-zero exit code is not one of these; it is reported through
/// `ProcessResult::exit_code`.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Failed to launch '{program}': {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' timed out after {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },

    #[error("Failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Agent lifecycle errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent already registered: {0}")]
    AlreadyExists(String),

    #[error("Agent not running: {0}")]
    NotRunning(String),

    #[error("Agent already running: {0}")]
    AlreadyRunning(String),

    #[error("Agent already scheduling: {0}")]
    AlreadyScheduling(String),

    #[error("Agent is still stopping: {0}")]
    Stopping(String),

    #[error("Update check for {agent} failed: {reason}")]
    UpdateCheckFailed { agent: String, reason: String },

    #[error("Invalid agent descriptor: {0}")]
    InvalidDescriptor(String),
}

/// Preference and configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown preference key: {0}")]
    UnknownKey(String),

    #[error("Preference {key} has wrong type: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("Invalid preferences file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("No async runtime available to run agents")]
    NoRuntime,
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
