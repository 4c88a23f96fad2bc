//! `acpvisor agents`

use crate::app::App;
use acpvisor_core::preferences::{keys, Preferences};
use acpvisor_core::AgentDescriptor;
use anyhow::Result;
use serde_json::json;

pub fn run(app: &App) -> Result<()> {
    let rows: Vec<AgentRow> = AgentDescriptor::builtin_agents()
        .into_iter()
        .map(|descriptor| AgentRow::resolve(descriptor, app.preferences.as_ref()))
        .collect();

    if app.json {
        let value: Vec<_> = rows
            .iter()
            .map(|row| {
                json!({
                    "id": row.descriptor.id,
                    "name": row.descriptor.display_name,
                    "startupCommand": row.startup,
                    "customized": row.customized,
                    "missingEnv": row.missing_env,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for row in &rows {
        let marker = if row.customized { "  (custom)" } else { "" };
        println!(
            "{:<18} {:<18} {}{}",
            row.descriptor.id,
            row.descriptor.display_name,
            row.startup.join(" "),
            marker
        );
        if !row.missing_env.is_empty() {
            println!("{:<18} missing environment: {}", "", row.missing_env.join(", "));
        }
    }
    Ok(())
}

struct AgentRow {
    descriptor: AgentDescriptor,
    startup: Vec<String>,
    customized: bool,
    missing_env: Vec<String>,
}

impl AgentRow {
    fn resolve(descriptor: AgentDescriptor, prefs: &dyn Preferences) -> Self {
        let startup = prefs
            .get_string_list(&keys::startup_command(&descriptor.id))
            .unwrap_or_else(|| descriptor.default_startup_command.clone());
        let customized = startup != descriptor.default_startup_command;
        let missing_env = descriptor
            .required_env
            .iter()
            .filter(|name| std::env::var_os(name.as_str()).is_none())
            .cloned()
            .collect();
        Self {
            descriptor,
            startup,
            customized,
            missing_env,
        }
    }
}
