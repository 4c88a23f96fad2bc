//! acpvisor Core Library
//!
//! This crate provides the lifecycle engine behind acpvisor, including:
//! - Scheduling, launching, supervising and stopping ACP agent processes
//! - Pre-launch self-updates of agent CLIs
//! - Reconciling each agent's MCP server registration
//! - Layered preferences and restart detection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     acpvisor-core                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  agent/        - Lifecycle state machine, updates, MCP      │
//! │  process/      - Command runner, process supervision        │
//! │  preferences/  - Defaults + overrides, lifecycle settings   │
//! │  types/        - Shared type definitions                    │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod error;
pub mod preferences;
pub mod process;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;

// Re-export agent components
pub use agent::{
    AgentController, AgentService, AgentServiceListener, LifecycleNotifier, McpPrompter,
    ReconcileReport, ServiceContext, SupervisorConfig,
};

// Re-export preference components
pub use preferences::{LifecycleSettings, PreferenceStore, Preferences};

// Re-export process components
pub use process::{ProcessRunner, TokioProcessRunner};
