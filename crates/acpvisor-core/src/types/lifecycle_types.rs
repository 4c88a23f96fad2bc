//! Agent lifecycle state types

use serde::{Deserialize, Serialize};

/// Stage of an agent subprocess in its supervised state machine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Never scheduled
    #[default]
    Idle,
    /// Accepted by `schedule()`, waiting for the background routine
    Scheduled,
    /// Running the update / registration routine
    CheckingUpdates,
    /// Spawning the agent process
    Starting,
    /// Process is live
    Running,
    /// Termination requested, waiting for the process to exit
    Stopping,
    Stopped,
    Failed,
}

impl LifecyclePhase {
    /// A schedule attempt is in flight and has not produced a process yet
    pub fn is_scheduling(self) -> bool {
        matches!(self, Self::Scheduled | Self::CheckingUpdates | Self::Starting)
    }

    /// No background work is pending for this agent
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Running | Self::Stopped | Self::Failed)
    }

    /// Phases in which `schedule()` is accepted
    pub fn can_schedule(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scheduled => "scheduled",
            Self::CheckingUpdates => "checking_updates",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an agent ended up in [`LifecyclePhase::Failed`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The executable could not be located or spawned
    ProcessLaunch,
    /// The self-update command failed under a required update policy
    UpdateCheck,
    /// The agent process exited while running without a stop request
    UnexpectedExit,
}

/// Structured status delivered with every Failed transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FailureStatus {
    pub agent_id: String,
    pub reason: FailureReason,
    /// Human-readable, never empty
    pub message: String,
    pub exit_code: Option<i32>,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl FailureStatus {
    pub fn new(agent_id: impl Into<String>, reason: FailureReason, message: impl Into<String>) -> Self {
        let agent_id = agent_id.into();
        let mut message = message.into();
        if message.trim().is_empty() {
            message = format!("{} failed ({:?})", agent_id, reason);
        }
        Self {
            agent_id,
            reason,
            message,
            exit_code: None,
            occurred_at: chrono::Utc::now(),
        }
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

impl std::fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Point-in-time view of one agent, for display and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub id: String,
    pub display_name: String,
    pub phase: LifecyclePhase,
    pub pid: Option<u32>,
    pub effective_startup_command: Option<Vec<String>>,
    pub last_failure: Option<FailureStatus>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A lifecycle transition, as published on the broadcast stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Scheduled { agent_id: String },
    Started { agent_id: String, pid: Option<u32> },
    Stopped { agent_id: String },
    Failed { agent_id: String, status: FailureStatus },
}

impl LifecycleEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Scheduled { agent_id }
            | Self::Started { agent_id, .. }
            | Self::Stopped { agent_id }
            | Self::Failed { agent_id, .. } => agent_id,
        }
    }
}
