//! Restarting agents after lifecycle settings change

use acpvisor_core::error::{AgentError, Error};
use acpvisor_core::{AgentController, LifecycleSettings};
use async_trait::async_trait;
use tracing::{error, info};

/// Asks whether active agents should be restarted to pick up changes
#[async_trait]
pub trait RestartConfirm: Send + Sync {
    async fn confirm_restart(&self, changes: &[&'static str], agents: &[String]) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Nothing lifecycle-relevant changed
    Unchanged,
    /// Settings changed but no agent was active; they apply to the next start
    NothingToRestart,
    /// The user kept the running agents as they are
    Declined,
    /// These agents were stopped and scheduled again
    Restarted(Vec<String>),
}

/// Compares the settings active agents were started with against the
/// current preferences and restarts the agents when they differ.
pub struct RestartCoordinator<'a> {
    controller: &'a AgentController,
    confirm: &'a dyn RestartConfirm,
}

impl<'a> RestartCoordinator<'a> {
    pub fn new(controller: &'a AgentController, confirm: &'a dyn RestartConfirm) -> Self {
        Self {
            controller,
            confirm,
        }
    }

    /// Returns the settings now in effect and what was done.
    ///
    /// When the restart is declined, `applied` stays in effect so the next
    /// check asks again.
    pub async fn apply(&self, applied: LifecycleSettings) -> (LifecycleSettings, RestartOutcome) {
        let current = self.controller.lifecycle_settings();
        if !applied.needs_restart(&current) {
            return (current, RestartOutcome::Unchanged);
        }

        let changes = applied.changes(&current);
        let active = self.controller.active_agents();
        if active.is_empty() {
            info!("Settings changed ({}); no agent to restart", changes.join(", "));
            return (current, RestartOutcome::NothingToRestart);
        }

        let ids: Vec<String> = active.iter().map(|s| s.id().to_string()).collect();
        if !self.confirm.confirm_restart(&changes, &ids).await {
            info!("Restart declined; running agents keep their previous settings");
            return (applied, RestartOutcome::Declined);
        }

        let mut restarted = Vec::new();
        for service in active {
            match service.stop().await {
                Ok(()) | Err(Error::Agent(AgentError::NotRunning(_))) => {}
                Err(e) => {
                    error!("Could not stop {} for restart: {}", service.id(), e);
                    continue;
                }
            }
            match service.schedule() {
                Ok(()) => restarted.push(service.id().to_string()),
                Err(e) => error!("Could not restart {}: {}", service.id(), e),
            }
        }

        info!("Restarted {} agent(s) after settings change", restarted.len());
        (current, RestartOutcome::Restarted(restarted))
    }
}
