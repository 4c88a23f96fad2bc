//! `acpvisor run <AGENT>...`

use crate::app::App;
use crate::prompt::TerminalPrompter;
use crate::restart::{RestartCoordinator, RestartOutcome};
use crate::signals::{self, Hangup};
use acpvisor_core::{LifecycleEvent, McpPrompter};
use anyhow::{bail, Result};
use clap::Args;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[derive(Args)]
pub struct RunArgs {
    /// Agents to start
    #[arg(required = true)]
    pub agents: Vec<String>,
}

pub async fn run(app: &App, args: &RunArgs) -> Result<()> {
    let prompter = Arc::new(TerminalPrompter::new(
        app.assume_yes,
        app.preferences.clone(),
        app.config_path.clone(),
    ));
    let controller = app.controller(Some(prompter.clone() as Arc<dyn McpPrompter>))?;

    for id in &args.agents {
        if controller.get(id).is_none() {
            bail!("unknown agent '{}'", id);
        }
    }

    let mut events = controller.notifier().subscribe();
    let mut applied = controller.lifecycle_settings();
    for id in &args.agents {
        controller.schedule(id)?;
    }

    let mut hangup = Hangup::install();
    let shutdown = signals::shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = hangup.recv() => {
                info!("Reloading preferences from {}", app.config_path.display());
                if let Err(e) = app.reload() {
                    error!("{:#}", e);
                    continue;
                }
                let (now, outcome) = RestartCoordinator::new(&controller, prompter.as_ref())
                    .apply(applied)
                    .await;
                applied = now;
                if let RestartOutcome::Restarted(ids) = outcome {
                    info!("Restarted: {}", ids.join(", "));
                }
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event, app.json)?,
                Err(RecvError::Lagged(missed)) => warn!("Missed {} lifecycle events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.stop_all().await;
    Ok(())
}

fn print_event(event: &LifecycleEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        LifecycleEvent::Scheduled { agent_id } => println!("[{}] scheduled", agent_id),
        LifecycleEvent::Started { agent_id, pid: Some(pid) } => {
            println!("[{}] running (pid {})", agent_id, pid)
        }
        LifecycleEvent::Started { agent_id, pid: None } => println!("[{}] running", agent_id),
        LifecycleEvent::Stopped { agent_id } => println!("[{}] stopped", agent_id),
        LifecycleEvent::Failed { agent_id, status } => println!("[{}] failed: {}", agent_id, status),
    }
    Ok(())
}
