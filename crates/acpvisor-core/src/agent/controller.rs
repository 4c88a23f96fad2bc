//! The set of agents this host knows about

use super::context::ServiceContext;
use super::notifier::LifecycleNotifier;
use super::service::AgentService;
use crate::error::{AgentError, Error, Result};
use crate::preferences::{LifecycleSettings, Preferences};
use crate::types::{AgentDescriptor, AgentSnapshot};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

/// Registry of agent services, in registration order
pub struct AgentController {
    services: Vec<Arc<AgentService>>,
    ctx: ServiceContext,
}

impl AgentController {
    /// One service per descriptor. Ids must be unique and descriptors valid.
    pub fn new(
        descriptors: impl IntoIterator<Item = AgentDescriptor>,
        ctx: ServiceContext,
    ) -> Result<Self> {
        let mut services: Vec<Arc<AgentService>> = Vec::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            if services.iter().any(|s| s.id() == descriptor.id) {
                return Err(Error::Agent(AgentError::AlreadyExists(descriptor.id)));
            }
            info!("Registered agent: {} ({})", descriptor.display_name, descriptor.id);
            services.push(Arc::new(AgentService::new(descriptor, ctx.clone())));
        }
        Ok(Self { services, ctx })
    }

    /// Controller for the built-in agents
    pub fn with_builtins(ctx: ServiceContext) -> Result<Self> {
        Self::new(AgentDescriptor::builtin_agents(), ctx)
    }

    pub fn agents(&self) -> &[Arc<AgentService>] {
        &self.services
    }

    pub fn get(&self, id: &str) -> Option<&Arc<AgentService>> {
        self.services.iter().find(|s| s.id() == id)
    }

    fn require(&self, id: &str) -> Result<&Arc<AgentService>> {
        self.get(id)
            .ok_or_else(|| Error::Agent(AgentError::NotFound(id.to_string())))
    }

    pub fn schedule(&self, id: &str) -> Result<()> {
        self.require(id)?.schedule()
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        self.require(id)?.stop().await
    }

    pub async fn version(&self, id: &str) -> Result<String> {
        Ok(self.require(id)?.version().await)
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.get(id).is_some_and(|s| s.is_running())
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.get(id).is_some_and(|s| s.is_scheduled())
    }

    /// Agents that are scheduled, running or stopping
    pub fn active_agents(&self) -> Vec<Arc<AgentService>> {
        self.services
            .iter()
            .filter(|s| !s.phase().can_schedule())
            .cloned()
            .collect()
    }

    /// Stop every active agent concurrently and wait for all of them
    pub async fn stop_all(&self) {
        let active = self.active_agents();
        if active.is_empty() {
            return;
        }
        info!("Stopping {} agent(s)", active.len());

        let results = join_all(active.iter().map(|s| s.stop())).await;
        for (service, result) in active.iter().zip(results) {
            match result {
                // Settled on its own between the snapshot and the stop call
                Ok(()) | Err(Error::Agent(AgentError::NotRunning(_))) => {}
                Err(e) => error!("Error stopping agent {}: {}", service.id(), e),
            }
        }
    }

    pub fn snapshots(&self) -> Vec<AgentSnapshot> {
        self.services.iter().map(|s| s.snapshot()).collect()
    }

    pub fn notifier(&self) -> &Arc<LifecycleNotifier> {
        &self.ctx.notifier
    }

    pub fn preferences(&self) -> &Arc<dyn Preferences> {
        &self.ctx.preferences
    }

    /// Current values of every preference that affects agent launches
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings::from_preferences(
            self.ctx.preferences.as_ref(),
            self.services.iter().map(|s| s.id()),
        )
    }
}

impl std::fmt::Debug for AgentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.services.iter()).finish()
    }
}
