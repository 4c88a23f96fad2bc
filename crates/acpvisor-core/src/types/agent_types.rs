//! Agent descriptor types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder replaced with the registration name
pub const NAME_PLACEHOLDER: &str = "{name}";
/// Placeholder replaced with the registration URL
pub const URL_PLACEHOLDER: &str = "{url}";

/// Desired external registration entry for an agent's MCP integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationTarget {
    pub name: String,
    pub url: String,
}

impl RegistrationTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Target for an MCP server listening on localhost over SSE
    pub fn local_sse(name: impl Into<String>, port: u16) -> Self {
        Self::new(name, format!("http://localhost:{}/sse", port))
    }
}

/// Argument vector with `{name}` / `{url}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }

    /// Substitute placeholders with the target's name and URL.
    /// Placeholders must occupy a whole argument.
    pub fn render(&self, target: &RegistrationTarget) -> Vec<String> {
        self.0
            .iter()
            .map(|arg| match arg.as_str() {
                NAME_PLACEHOLDER => target.name.clone(),
                URL_PLACEHOLDER => target.url.clone(),
                _ => arg.clone(),
            })
            .collect()
    }
}

/// The three commands used to converge an agent's MCP registration list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationCommands {
    pub list: Vec<String>,
    pub add: CommandTemplate,
    pub remove: CommandTemplate,
}

/// What a failing self-update command means for the schedule attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Failure aborts the attempt
    #[default]
    Required,
    /// Failure is logged and startup continues
    BestEffort,
}

/// Immutable description of one agent kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    pub display_name: String,
    /// Install/profile location, relative to the data directory
    pub folder_name: String,
    pub default_startup_command: Vec<String>,
    pub version_command: Vec<String>,
    #[serde(default)]
    pub update_command: Option<Vec<String>>,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    #[serde(default)]
    pub registration: Option<RegistrationCommands>,
    /// Environment variables the agent expects to inherit (names only)
    #[serde(default)]
    pub required_env: Vec<String>,
    /// Extra environment applied on top of the inherited one
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl AgentDescriptor {
    /// Create a descriptor with only the mandatory fields set
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        startup: Vec<String>,
    ) -> Self {
        let id = id.into();
        let program = startup.first().cloned().unwrap_or_default();
        Self {
            folder_name: id.clone(),
            id,
            display_name: display_name.into(),
            default_startup_command: startup,
            version_command: vec![program, "--version".to_string()],
            update_command: None,
            update_policy: UpdatePolicy::Required,
            registration: None,
            required_env: Vec::new(),
            env: HashMap::new(),
        }
    }

    pub fn with_version_command(mut self, command: Vec<String>) -> Self {
        self.version_command = command;
        self
    }

    pub fn with_update_command(mut self, command: Vec<String>, policy: UpdatePolicy) -> Self {
        self.update_command = Some(command);
        self.update_policy = policy;
        self
    }

    pub fn with_registration(mut self, commands: RegistrationCommands) -> Self {
        self.registration = Some(commands);
        self
    }

    pub fn with_required_env(mut self, name: impl Into<String>) -> Self {
        self.required_env.push(name.into());
        self
    }

    /// Registration commands in the `<cli> mcp list|add|remove` shape shared by
    /// most ACP agent CLIs.
    pub fn mcp_subcommands(program: &str) -> RegistrationCommands {
        RegistrationCommands {
            list: vec![program.to_string(), "mcp".to_string(), "list".to_string()],
            add: CommandTemplate::new([
                program,
                "mcp",
                "add",
                "--transport",
                "sse",
                NAME_PLACEHOLDER,
                URL_PLACEHOLDER,
            ]),
            remove: CommandTemplate::new([program, "mcp", "remove", NAME_PLACEHOLDER]),
        }
    }

    /// Claude Code through the `claude-code-acp` bridge.
    /// Its version is managed by npm, so there is no self-update step.
    pub fn claude_code() -> Self {
        Self::new(
            "claude-code-acp",
            "Claude Code ACP",
            vec!["claude-code-acp".to_string()],
        )
        .with_registration(Self::mcp_subcommands("claude-code-acp"))
        .with_required_env("ANTHROPIC_API_KEY")
    }

    /// Google's Gemini CLI with native ACP support
    pub fn gemini_cli() -> Self {
        let mut descriptor = Self::new(
            "gemini-cli",
            "Gemini CLI",
            vec!["gemini".to_string(), "--experimental-acp".to_string()],
        )
        .with_version_command(vec!["gemini".to_string(), "--version".to_string()])
        .with_update_command(
            vec![
                "npm".to_string(),
                "install".to_string(),
                "-g".to_string(),
                "@google/gemini-cli@latest".to_string(),
            ],
            UpdatePolicy::BestEffort,
        )
        .with_registration(Self::mcp_subcommands("gemini"))
        .with_required_env("GEMINI_API_KEY");
        descriptor.folder_name = "gemini".to_string();
        descriptor
    }

    /// All built-in agent kinds, in display order
    pub fn builtin_agents() -> Vec<Self> {
        vec![Self::claude_code(), Self::gemini_cli()]
    }

    /// Check that the descriptor can be used to launch anything at all
    pub fn validate(&self) -> crate::Result<()> {
        use crate::error::AgentError;

        if self.id.trim().is_empty() {
            return Err(AgentError::InvalidDescriptor("agent id cannot be empty".to_string()).into());
        }
        if self.default_startup_command.is_empty() {
            return Err(AgentError::InvalidDescriptor(format!(
                "agent '{}' has an empty startup command",
                self.id
            ))
            .into());
        }
        if self.version_command.is_empty() {
            return Err(AgentError::InvalidDescriptor(format!(
                "agent '{}' has an empty version command",
                self.id
            ))
            .into());
        }
        Ok(())
    }
}
