//! Preference access with default + override semantics
//!
//! The engine reads its configuration through the [`Preferences`] trait so the
//! host can plug in whatever key/value store it persists to. [`PreferenceStore`]
//! is the in-memory implementation used by the CLI, with JSON file overrides.

mod settings;
mod store;

pub use settings::LifecycleSettings;
pub use store::PreferenceStore;

use serde_json::Value;

/// Preference keys consumed by the engine
pub mod keys {
    /// Directory agents run in
    pub const WORKING_DIR: &str = "acp.workingDirectory";
    pub const FILE_READ: &str = "acp.fileRead";
    pub const FILE_WRITE: &str = "acp.fileWrite";
    /// Ask the user to enable MCP when it is disabled
    pub const PROMPT_FOR_MCP: &str = "acp.promptForMcp";
    pub const MCP_SERVER_ENABLED: &str = "mcp.server.enabled";
    pub const MCP_SERVER_HTTP_PORT: &str = "mcp.server.httpPort";
    /// Name the MCP server is registered under in each agent CLI
    pub const MCP_SERVER_NAME: &str = "mcp.server.name";

    const STARTUP_PREFIX: &str = "agent.";
    const STARTUP_SUFFIX: &str = ".startupCommand";

    /// Per-agent startup command override
    pub fn startup_command(agent_id: &str) -> String {
        format!("{}{}{}", STARTUP_PREFIX, agent_id, STARTUP_SUFFIX)
    }

    /// Agent id of a startup override key, if `key` is one
    pub fn startup_command_agent(key: &str) -> Option<&str> {
        key.strip_prefix(STARTUP_PREFIX)?
            .strip_suffix(STARTUP_SUFFIX)
            .filter(|id| !id.is_empty())
    }
}

/// Key/value configuration store with default and override layers.
///
/// Implementations must be cheap to read; the engine reads preferences at
/// schedule time from background tasks.
pub trait Preferences: Send + Sync {
    /// Effective value: the override if set, else the default
    fn get(&self, key: &str) -> Option<Value>;

    /// Default value, ignoring any override
    fn default_value(&self, key: &str) -> Option<Value>;

    /// Set an override
    fn set(&self, key: &str, value: Value);

    /// Remove an override, restoring the default
    fn reset(&self, key: &str);

    fn get_string(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Numeric preference, accepting numbers stored as strings
    fn get_u16(&self, key: &str) -> Option<u16> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Directory preference; blank reads as `None`
    fn get_path(&self, key: &str) -> Option<std::path::PathBuf> {
        let raw = self.get_string(key);
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| std::path::PathBuf::from(trimmed))
    }

    /// Argument vector preference. Arrays are taken element-wise, strings are
    /// split on whitespace. Empty values read as `None`.
    fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        let list: Vec<String> = match self.get(key)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
            _ => return None,
        };
        if list.is_empty() || list.iter().all(|s| s.trim().is_empty()) {
            None
        } else {
            Some(list)
        }
    }
}
