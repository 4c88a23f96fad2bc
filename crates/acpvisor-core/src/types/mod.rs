//! Core type definitions for acpvisor
//!
//! Shared value types: agent descriptors, lifecycle state and external
//! command results.

mod agent_types;
mod lifecycle_types;
mod process_types;

pub use agent_types::*;
pub use lifecycle_types::*;
pub use process_types::*;
