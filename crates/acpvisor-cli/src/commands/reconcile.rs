//! `acpvisor reconcile <AGENT>`

use crate::app::App;
use acpvisor_core::agent::ReconcileAction;
use acpvisor_core::preferences::{keys, Preferences};
use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

#[derive(Args)]
pub struct ReconcileArgs {
    /// Agent whose MCP registration to fix up
    pub agent: String,
}

pub async fn run(app: &App, args: &ReconcileArgs) -> Result<()> {
    let controller = app.controller(None)?;
    let service = controller
        .get(&args.agent)
        .with_context(|| format!("unknown agent '{}'", args.agent))?;

    if !app.preferences.get_bool(keys::MCP_SERVER_ENABLED) {
        warn!(
            "{} is off; agents will not be pointed at the MCP server on start",
            keys::MCP_SERVER_ENABLED
        );
    }

    let Some(report) = service.reconcile_registration().await? else {
        println!("{} has no MCP registration commands", service.display_name());
        return Ok(());
    };

    if app.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_noop() {
        println!("{}: registration is up to date", service.id());
    }
    for action in &report.actions {
        let verb = match action {
            ReconcileAction::Remove => "removed stale registration",
            ReconcileAction::Add => "added registration",
        };
        println!("{}: {}", service.id(), verb);
    }
    for warning in &report.warnings {
        println!("{}: warning: {}", service.id(), warning);
    }
    Ok(())
}
