//! Agent lifecycle management
//!
//! This module handles:
//! - Per-agent lifecycle state machines (`AgentService`)
//! - Pre-launch update checks and the MCP opt-in prompt
//! - MCP registration reconciliation against the agent's own CLI
//! - Lifecycle notifications to listeners and subscribers
//! - The ordered set of known agents (`AgentController`)

mod context;
mod controller;
mod notifier;
mod prompt;
mod reconciler;
mod service;
mod updater;

pub use context::{ServiceContext, SupervisorConfig};
pub use controller::AgentController;
pub use notifier::{AgentServiceListener, LifecycleNotifier, ListenerId};
pub use prompt::McpPrompter;
pub use reconciler::{
    ReconcileAction, ReconcileReport, ReconciliationWarning, RegistrationReconciler,
    FAILURE_MARKER,
};
pub use service::{AgentService, VERSION_NOT_FOUND};
