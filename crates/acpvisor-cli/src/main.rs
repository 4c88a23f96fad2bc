//! acpvisor - headless supervisor for ACP coding agents
//!
//! Starts agent CLIs, keeps their MCP registration in line with the
//! preferences and restarts them when lifecycle settings change.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod cli;
mod commands;
mod prompt;
mod restart;
mod signals;

use cli::Cli;

#[tokio::main]
async fn main() {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
