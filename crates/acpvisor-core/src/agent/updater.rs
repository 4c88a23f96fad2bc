//! Pre-launch maintenance: self-update, MCP opt-in prompt, registration

use super::context::ServiceContext;
use super::reconciler::{ReconcileReport, RegistrationReconciler};
use super::service::agent_command;
use crate::error::{AgentError, Result};
use crate::preferences::{keys, LifecycleSettings};
use crate::types::{AgentDescriptor, UpdatePolicy};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The maintenance steps run before an agent is spawned with its default
/// startup command.
pub(super) struct UpdateCheck<'a> {
    descriptor: &'a Arc<AgentDescriptor>,
    ctx: &'a ServiceContext,
}

impl<'a> UpdateCheck<'a> {
    pub fn new(descriptor: &'a Arc<AgentDescriptor>, ctx: &'a ServiceContext) -> Self {
        Self { descriptor, ctx }
    }

    /// Run the checks for a launch of `startup`.
    ///
    /// Only a failed self-update under [`UpdatePolicy::Required`] is an error.
    /// Prompting and registration problems are logged and never block the
    /// launch.
    pub async fn run(&self, startup: &[String]) -> Result<()> {
        if startup != self.descriptor.default_startup_command.as_slice() {
            info!(
                "{} uses a custom startup command, skipping update check",
                self.descriptor.display_name
            );
            return Ok(());
        }

        self.self_update().await?;
        self.prompt_for_mcp();

        if self.ctx.preferences.get_bool(keys::MCP_SERVER_ENABLED) {
            if let Err(e) = self.reconcile_registration().await {
                warn!(
                    "Could not register MCP server with {}: {}",
                    self.descriptor.display_name, e
                );
            }
        }

        Ok(())
    }

    async fn self_update(&self) -> Result<()> {
        let Some(command) = &self.descriptor.update_command else {
            return Ok(());
        };

        let spec = agent_command(self.descriptor, self.ctx.preferences.as_ref(), command.clone());
        info!("Updating {}: {}", self.descriptor.display_name, spec.display());

        let reason = match self.ctx.runner.run(&spec).await {
            Ok(result) if result.success() => {
                debug!("{} is up to date", self.descriptor.display_name);
                return Ok(());
            }
            Ok(result) => match result.stderr_lines.iter().rev().find(|l| !l.trim().is_empty()) {
                Some(line) => format!("update exited with code {}: {}", result.exit_code, line),
                None => format!("update exited with code {}", result.exit_code),
            },
            Err(e) => e.to_string(),
        };

        match self.descriptor.update_policy {
            UpdatePolicy::Required => Err(AgentError::UpdateCheckFailed {
                agent: self.descriptor.id.clone(),
                reason,
            }
            .into()),
            UpdatePolicy::BestEffort => {
                warn!(
                    "Update of {} failed, starting the installed version: {}",
                    self.descriptor.display_name, reason
                );
                Ok(())
            }
        }
    }

    /// Ask about enabling MCP without waiting for the answer
    fn prompt_for_mcp(&self) {
        let prefs = &self.ctx.preferences;
        if !prefs.get_bool(keys::PROMPT_FOR_MCP) || prefs.get_bool(keys::MCP_SERVER_ENABLED) {
            return;
        }
        let Some(prompter) = self.ctx.prompter.clone() else {
            debug!("No prompter configured, not asking about MCP");
            return;
        };

        let descriptor = Arc::clone(self.descriptor);
        let preferences = Arc::clone(&self.ctx.preferences);
        self.ctx.runtime().spawn(async move {
            if prompter.confirm_enable_mcp(&descriptor).await {
                info!("MCP integration enabled; it applies from the next agent start");
                preferences.set(keys::MCP_SERVER_ENABLED, Value::Bool(true));
            } else {
                debug!("MCP integration declined for {}", descriptor.display_name);
            }
        });
    }

    /// Converge the agent's MCP registration list to the configured server.
    /// `None` when the agent has no registration commands.
    pub async fn reconcile_registration(&self) -> Result<Option<ReconcileReport>> {
        let Some(commands) = &self.descriptor.registration else {
            debug!("{} has no MCP registration commands", self.descriptor.display_name);
            return Ok(None);
        };

        let settings =
            LifecycleSettings::from_preferences(self.ctx.preferences.as_ref(), [self.descriptor.id.as_str()]);
        let report = RegistrationReconciler::new(self.ctx.runner.as_ref(), commands)
            .with_cwd(settings.working_dir_path())
            .with_env(self.descriptor.env.clone())
            .reconcile(&settings.mcp_target())
            .await?;
        Ok(Some(report))
    }
}
