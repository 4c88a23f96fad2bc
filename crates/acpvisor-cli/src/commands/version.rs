//! `acpvisor version [AGENT]`

use crate::app::App;
use anyhow::{bail, Result};
use clap::Args;
use serde_json::{Map, Value};

#[derive(Args)]
pub struct VersionArgs {
    /// Only this agent
    pub agent: Option<String>,
}

pub async fn run(app: &App, args: &VersionArgs) -> Result<()> {
    let controller = app.controller(None)?;

    let services: Vec<_> = match &args.agent {
        Some(id) => match controller.get(id) {
            Some(service) => vec![service.clone()],
            None => bail!("unknown agent '{}'", id),
        },
        None => controller.agents().to_vec(),
    };

    let mut versions = Map::new();
    for service in &services {
        let version = service.version().await;
        if !app.json {
            println!("{:<18} {}", service.id(), version);
        }
        versions.insert(service.id().to_string(), Value::String(version));
    }

    if app.json {
        println!("{}", serde_json::to_string_pretty(&Value::Object(versions))?);
    }
    Ok(())
}
