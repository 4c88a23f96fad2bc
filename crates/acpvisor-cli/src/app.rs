//! Shared state of one CLI invocation

use acpvisor_core::agent::{AgentController, McpPrompter, ServiceContext, SupervisorConfig};
use acpvisor_core::{AgentDescriptor, PreferenceStore};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Preferences, tunables and output flags resolved from the command line
pub struct App {
    pub config_path: PathBuf,
    pub preferences: Arc<PreferenceStore>,
    pub supervisor: SupervisorConfig,
    /// Print machine-readable JSON instead of text
    pub json: bool,
    /// Answer yes to every confirmation prompt
    pub assume_yes: bool,
}

impl App {
    pub fn load(
        config: Option<PathBuf>,
        supervisor: SupervisorConfig,
        json: bool,
        assume_yes: bool,
    ) -> Result<Self> {
        let config_path = config
            .or_else(PreferenceStore::default_path)
            .context("cannot determine the configuration directory; pass --config")?;
        let preferences = PreferenceStore::load(&config_path)
            .with_context(|| format!("failed to load preferences from {}", config_path.display()))?;

        Ok(Self {
            config_path,
            preferences: Arc::new(preferences),
            supervisor,
            json,
            assume_yes,
        })
    }

    /// Re-read the overrides file
    pub fn reload(&self) -> Result<()> {
        self.preferences
            .load_overrides(&self.config_path)
            .with_context(|| format!("failed to reload {}", self.config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.preferences
            .save_overrides(&self.config_path)
            .with_context(|| format!("failed to write {}", self.config_path.display()))
    }

    /// Controller for the built-in agents, bound to the current runtime
    pub fn controller(&self, prompter: Option<Arc<dyn McpPrompter>>) -> Result<AgentController> {
        let mut ctx = ServiceContext::from_config(&self.supervisor, self.preferences.clone())?;
        if let Some(prompter) = prompter {
            ctx = ctx.with_prompter(prompter);
        }
        Ok(AgentController::new(AgentDescriptor::builtin_agents(), ctx)?)
    }
}
