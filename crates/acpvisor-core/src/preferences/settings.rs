//! Typed snapshot of the lifecycle-relevant preferences

use super::store::DEFAULT_MCP_PORT;
use super::{keys, Preferences};
use crate::types::RegistrationTarget;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Every preference that influences how an agent is launched.
///
/// Running agents only pick these up on their next start, so any difference
/// between the applied snapshot and the current one means a restart is due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSettings {
    pub working_dir: String,
    pub file_read: bool,
    pub file_write: bool,
    pub mcp_server_enabled: bool,
    pub mcp_server_port: u16,
    pub mcp_server_name: String,
    /// Startup overrides by agent id; agents without an override are absent
    pub startup_overrides: BTreeMap<String, Vec<String>>,
}

impl LifecycleSettings {
    pub fn from_preferences<'a>(
        prefs: &dyn Preferences,
        agent_ids: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let startup_overrides = agent_ids
            .into_iter()
            .filter_map(|id| {
                prefs
                    .get_string_list(&keys::startup_command(id))
                    .map(|cmd| (id.to_string(), cmd))
            })
            .collect();

        Self {
            working_dir: prefs.get_string(keys::WORKING_DIR),
            file_read: prefs.get_bool(keys::FILE_READ),
            file_write: prefs.get_bool(keys::FILE_WRITE),
            mcp_server_enabled: prefs.get_bool(keys::MCP_SERVER_ENABLED),
            mcp_server_port: prefs
                .get_u16(keys::MCP_SERVER_HTTP_PORT)
                .unwrap_or(DEFAULT_MCP_PORT),
            mcp_server_name: prefs.get_string(keys::MCP_SERVER_NAME),
            startup_overrides,
        }
    }

    /// Names of the settings that differ between `self` and `other`
    pub fn changes(&self, other: &Self) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.working_dir != other.working_dir {
            changed.push("working directory");
        }
        if self.file_read != other.file_read {
            changed.push("file read access");
        }
        if self.file_write != other.file_write {
            changed.push("file write access");
        }
        if self.mcp_server_enabled != other.mcp_server_enabled {
            changed.push("MCP server enabled");
        }
        if self.mcp_server_port != other.mcp_server_port {
            changed.push("MCP server port");
        }
        if self.mcp_server_name != other.mcp_server_name {
            changed.push("MCP server name");
        }
        if self.startup_overrides != other.startup_overrides {
            changed.push("startup commands");
        }
        changed
    }

    /// Whether agents started under `self` must restart to apply `other`
    pub fn needs_restart(&self, other: &Self) -> bool {
        !self.changes(other).is_empty()
    }

    /// Working directory for agent processes, if one is configured
    pub fn working_dir_path(&self) -> Option<PathBuf> {
        let trimmed = self.working_dir.trim();
        (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
    }

    /// Registration agents should carry for the MCP server
    pub fn mcp_target(&self) -> RegistrationTarget {
        RegistrationTarget::local_sse(self.mcp_server_name.clone(), self.mcp_server_port)
    }
}
