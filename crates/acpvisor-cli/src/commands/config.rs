//! `acpvisor config ...`

use crate::app::App;
use acpvisor_core::preferences::{keys, Preferences};
use acpvisor_core::AgentDescriptor;
use anyhow::{bail, Result};
use clap::Subcommand;
use serde_json::{Map, Value};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show effective values (all keys, or one)
    Get {
        key: Option<String>,
    },
    /// Override a value
    Set {
        key: String,
        value: String,
    },
    /// Remove an override, restoring the default
    Reset {
        key: String,
    },
    /// Print the preferences file location
    Path,
}

pub fn run(app: &App, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Get { key: Some(key) } => {
            if !app.preferences.is_known_key(&key) {
                bail!("unknown preference '{}'", key);
            }
            println!("{}", display_value(app.preferences.get(&key).as_ref()));
        }
        ConfigCommand::Get { key: None } => {
            let names = all_keys(app);
            if app.json {
                let map: Map<String, Value> = names
                    .into_iter()
                    .map(|k| {
                        let value = app.preferences.get(&k).unwrap_or(Value::Null);
                        (k, value)
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&Value::Object(map))?);
            } else {
                let overrides = app.preferences.overrides();
                for key in names {
                    let marker = if overrides.contains_key(&key) { " *" } else { "" };
                    println!(
                        "{} = {}{}",
                        key,
                        display_value(app.preferences.get(&key).as_ref()),
                        marker
                    );
                }
            }
        }
        ConfigCommand::Set { key, value } => {
            app.preferences.set_from_str(&key, &value)?;
            app.save()?;
            println!("{} = {}", key, display_value(app.preferences.get(&key).as_ref()));
            println!("Send SIGHUP to a running `acpvisor run` to apply");
        }
        ConfigCommand::Reset { key } => {
            if !app.preferences.is_known_key(&key) {
                bail!("unknown preference '{}'", key);
            }
            app.preferences.reset(&key);
            app.save()?;
            println!("{} = {}", key, display_value(app.preferences.get(&key).as_ref()));
        }
        ConfigCommand::Path => println!("{}", app.config_path.display()),
    }
    Ok(())
}

/// Keys with defaults, then the startup command key of every built-in agent
fn all_keys(app: &App) -> Vec<String> {
    let mut names = app.preferences.known_keys();
    names.extend(
        AgentDescriptor::builtin_agents()
            .iter()
            .map(|d| keys::startup_command(&d.id)),
    );
    names
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "(unset)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acpvisor_core::agent::SupervisorConfig;
    use tempfile::tempdir;

    fn app(dir: &std::path::Path) -> App {
        App::load(
            Some(dir.join("preferences.json")),
            SupervisorConfig::default(),
            false,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_set_persists_and_reset_restores() {
        let dir = tempdir().unwrap();

        run(
            &app(dir.path()),
            ConfigCommand::Set {
                key: keys::MCP_SERVER_ENABLED.to_string(),
                value: "yes".to_string(),
            },
        )
        .unwrap();
        assert!(app(dir.path()).preferences.get_bool(keys::MCP_SERVER_ENABLED));

        run(
            &app(dir.path()),
            ConfigCommand::Reset {
                key: keys::MCP_SERVER_ENABLED.to_string(),
            },
        )
        .unwrap();
        assert!(!app(dir.path()).preferences.get_bool(keys::MCP_SERVER_ENABLED));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempdir().unwrap();
        let app = app(dir.path());

        assert!(run(&app, ConfigCommand::Get { key: Some("nope".to_string()) }).is_err());
        assert!(run(
            &app,
            ConfigCommand::Set {
                key: "nope".to_string(),
                value: "1".to_string()
            }
        )
        .is_err());
        assert!(!dir.path().join("preferences.json").exists());
    }

    #[test]
    fn test_all_keys_include_agent_startup_commands() {
        let dir = tempdir().unwrap();
        let names = all_keys(&app(dir.path()));
        assert!(names.contains(&keys::startup_command("gemini-cli")));
        assert!(names.contains(&keys::MCP_SERVER_HTTP_PORT.to_string()));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(None), "(unset)");
        assert_eq!(display_value(Some(&Value::Bool(true))), "true");
        assert_eq!(
            display_value(Some(&serde_json::json!(["gemini", "--experimental-acp"]))),
            "gemini --experimental-acp"
        );
    }
}
