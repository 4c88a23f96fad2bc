//! Collaborators shared by every agent service

use super::notifier::LifecycleNotifier;
use super::prompt::McpPrompter;
use crate::error::{ConfigError, Result};
use crate::preferences::Preferences;
use crate::process::{ProcessRunner, TokioProcessRunner, DEFAULT_COMMAND_TIMEOUT, DEFAULT_STOP_GRACE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Engine tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Time an agent gets to exit after a stop request before it is killed
    pub stop_grace_secs: u64,
    /// Upper bound for version/update/registration commands
    pub command_timeout_secs: u64,
}

impl SupervisorConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stop_grace_secs: DEFAULT_STOP_GRACE.as_secs(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
        }
    }
}

/// Everything an `AgentService` needs from the outside world.
///
/// Cloning is cheap; all collaborators are shared.
#[derive(Clone)]
pub struct ServiceContext {
    pub runner: Arc<dyn ProcessRunner>,
    pub preferences: Arc<dyn Preferences>,
    pub notifier: Arc<LifecycleNotifier>,
    pub prompter: Option<Arc<dyn McpPrompter>>,
    pub stop_grace: Duration,
    runtime: Handle,
}

impl ServiceContext {
    /// Context bound to the tokio runtime of the calling thread
    pub fn new(runner: Arc<dyn ProcessRunner>, preferences: Arc<dyn Preferences>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self {
            runner,
            preferences,
            notifier: Arc::new(LifecycleNotifier::new()),
            prompter: None,
            stop_grace: DEFAULT_STOP_GRACE,
            runtime,
        })
    }

    /// Context using the tokio process runner configured from `config`
    pub fn from_config(config: &SupervisorConfig, preferences: Arc<dyn Preferences>) -> Result<Self> {
        let runner = Arc::new(TokioProcessRunner::with_timeout(config.command_timeout()));
        Ok(Self::new(runner, preferences)?.with_stop_grace(config.stop_grace()))
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn McpPrompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Runtime background lifecycle work is spawned on
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("has_prompter", &self.prompter.is_some())
            .field("stop_grace", &self.stop_grace)
            .finish_non_exhaustive()
    }
}
