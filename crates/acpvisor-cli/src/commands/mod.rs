//! Subcommand implementations

pub mod agents;
pub mod config;
pub mod reconcile;
pub mod run;
pub mod version;
