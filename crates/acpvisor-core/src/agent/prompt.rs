//! Interactive prompt seam

use crate::types::AgentDescriptor;
use async_trait::async_trait;

/// Asks the user whether MCP integration should be enabled.
///
/// The engine dispatches this onto its own task and never waits for the
/// answer; implementations decide which execution context shows the prompt.
#[async_trait]
pub trait McpPrompter: Send + Sync {
    /// Returns `true` when the user wants MCP enabled
    async fn confirm_enable_mcp(&self, agent: &AgentDescriptor) -> bool;
}
