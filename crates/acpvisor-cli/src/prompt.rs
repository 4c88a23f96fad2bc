//! Terminal confirmation prompts

use crate::restart::RestartConfirm;
use acpvisor_core::preferences::{keys, Preferences};
use acpvisor_core::{AgentDescriptor, McpPrompter, PreferenceStore};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Puts one yes/no question to the user; blocking
type Question = Arc<dyn Fn(String, bool) -> Result<bool, String> + Send + Sync>;

fn ask_on_terminal(prompt: String, default: bool) -> Result<bool, String> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(|e| e.to_string())
}

/// Asks on the controlling terminal, one question at a time. Without a
/// terminal every question is answered no, unless `assume_yes` is set.
pub struct TerminalPrompter {
    assume_yes: bool,
    preferences: Arc<PreferenceStore>,
    config_path: PathBuf,
    question: Question,
    /// Held while a question is on screen
    asking: Mutex<()>,
}

impl TerminalPrompter {
    pub fn new(assume_yes: bool, preferences: Arc<PreferenceStore>, config_path: PathBuf) -> Self {
        Self {
            assume_yes,
            preferences,
            config_path,
            question: Arc::new(ask_on_terminal),
            asking: Mutex::new(()),
        }
    }

    #[cfg(test)]
    fn with_question(
        mut self,
        question: impl Fn(String, bool) -> Result<bool, String> + Send + Sync + 'static,
    ) -> Self {
        self.question = Arc::new(question);
        self
    }

    /// Callers hold `asking`
    async fn confirm(&self, prompt: String, default: bool) -> bool {
        if self.assume_yes {
            return true;
        }

        let question = Arc::clone(&self.question);
        let answer = tokio::task::spawn_blocking(move || question(prompt, default)).await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                warn!("Cannot prompt on this terminal ({}), assuming no", e);
                false
            }
            Err(e) => {
                error!("Prompt task failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl McpPrompter for TerminalPrompter {
    async fn confirm_enable_mcp(&self, agent: &AgentDescriptor) -> bool {
        let _asking = self.asking.lock().await;
        // Another agent's prompt may have been answered while this one waited
        if self.preferences.get_bool(keys::MCP_SERVER_ENABLED) {
            debug!("MCP server already enabled, not asking for {}", agent.display_name);
            return true;
        }

        let prompt = format!(
            "Let {} use this host's MCP server? It takes effect on the next start.",
            agent.display_name
        );
        if !self.confirm(prompt, true).await {
            return false;
        }

        // Persist now so a later reload does not drop the answer
        self.preferences.set(keys::MCP_SERVER_ENABLED, Value::Bool(true));
        match self.preferences.save_overrides(&self.config_path) {
            Ok(()) => info!("Saved MCP opt-in to {}", self.config_path.display()),
            Err(e) => error!("Failed to save MCP opt-in: {}", e),
        }
        true
    }
}

#[async_trait]
impl RestartConfirm for TerminalPrompter {
    async fn confirm_restart(&self, changes: &[&'static str], agents: &[String]) -> bool {
        let prompt = format!(
            "Changed: {}. Restart {} now?",
            changes.join(", "),
            agents.join(", ")
        );
        let _asking = self.asking.lock().await;
        self.confirm(prompt, true).await
    }
}
