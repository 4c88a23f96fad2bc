//! CLI argument parsing with clap derive

use acpvisor_core::agent::SupervisorConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::app::App;
use crate::commands;

/// Headless supervisor for ACP coding agents
#[derive(Parser)]
#[command(
    name = "acpvisor",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Preferences file [default: <config dir>/acpvisor/preferences.json]
    #[arg(long, global = true, env = "ACPVISOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds an agent gets to exit after SIGTERM before it is killed
    #[arg(long, global = true, default_value_t = SupervisorConfig::default().stop_grace_secs)]
    pub stop_grace: u64,

    /// Timeout for version, update and registration commands, in seconds
    #[arg(long, global = true, default_value_t = SupervisorConfig::default().command_timeout_secs)]
    pub command_timeout: u64,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true, env = "ACPVISOR_YES")]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List known agents and their startup commands
    Agents,

    /// Show installed agent versions
    Version(commands::version::VersionArgs),

    /// Bring an agent's MCP registration in line with the preferences
    Reconcile(commands::reconcile::ReconcileArgs),

    /// Start agents and supervise them until interrupted
    Run(commands::run::RunArgs),

    /// Manage preferences
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        let supervisor = SupervisorConfig {
            stop_grace_secs: self.stop_grace,
            command_timeout_secs: self.command_timeout,
        };
        let app = App::load(self.config, supervisor, self.json, self.yes)?;

        match self.command {
            Command::Agents => commands::agents::run(&app),
            Command::Version(args) => commands::version::run(&app, &args).await,
            Command::Reconcile(args) => commands::reconcile::run(&app, &args).await,
            Command::Run(args) => commands::run::run(&app, &args).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
        }
    }
}
