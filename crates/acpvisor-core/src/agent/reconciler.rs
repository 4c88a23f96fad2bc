//! MCP registration reconciliation
//!
//! An agent CLI keeps its own list of MCP servers. The reconciler compares
//! that list with the desired registration and issues the smallest set of
//! `remove`/`add` commands that makes them agree:
//!
//! ```text
//!   list ──► url present? ──yes──► done (check health marker)
//!               │ no
//!               ▼
//!          name present? ──yes──► remove {name}
//!               │                     │
//!               ▼                     ▼
//!          add {name} {url} ◄─────────┘
//!               │
//!               ▼
//!          list again ──► confirm
//! ```

use crate::error::Result;
use crate::process::ProcessRunner;
use crate::types::{CommandSpec, ProcessResult, RegistrationCommands, RegistrationTarget};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Glyph agent CLIs print next to a registered server that is unhealthy
pub const FAILURE_MARKER: char = '✗';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    Remove,
    Add,
}

/// Non-fatal findings of a reconciliation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationWarning {
    /// After `add`, neither the name nor the URL showed up in the list
    NotConfirmed { target: RegistrationTarget },
    /// The registration exists but the CLI reports it as failing
    FailureMarker { line: String },
}

impl fmt::Display for ReconciliationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfirmed { target } => write!(
                f,
                "registration '{}' ({}) did not appear after adding it",
                target.name, target.url
            ),
            Self::FailureMarker { line } => write!(f, "agent reports a failing MCP server: {}", line),
        }
    }
}

/// What a reconciliation run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub actions: Vec<ReconcileAction>,
    pub warnings: Vec<ReconciliationWarning>,
}

impl ReconcileReport {
    /// No commands were issued
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Result of scanning one `list` output
#[derive(Debug, Default)]
struct ListScan {
    found_name: bool,
    found_url: bool,
    /// Last line containing the URL
    matched_line: Option<String>,
}

impl ListScan {
    fn of(output: &ProcessResult, target: &RegistrationTarget) -> Self {
        let mut scan = Self::default();
        for line in &output.stdout_lines {
            if line.contains(&target.name) {
                scan.found_name = true;
            }
            if line.contains(&target.url) {
                scan.found_url = true;
                scan.matched_line = Some(line.clone());
            }
        }
        scan
    }
}

/// Converges one agent's MCP registration list to a target
pub struct RegistrationReconciler<'a> {
    runner: &'a dyn ProcessRunner,
    commands: &'a RegistrationCommands,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl<'a> RegistrationReconciler<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, commands: &'a RegistrationCommands) -> Self {
        Self {
            runner,
            commands,
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Make the agent's registration list contain `target`.
    ///
    /// Launch failures of list/add/remove are errors. Everything else,
    /// including non-zero exit codes, ends up in the log or the report.
    pub async fn reconcile(&self, target: &RegistrationTarget) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let listed = self.exec(self.commands.list.clone()).await?;
        let mut scan = ListScan::of(&listed, target);
        debug!(
            "MCP list for '{}': name found={}, url found={}",
            target.name, scan.found_name, scan.found_url
        );

        if !scan.found_url {
            if scan.found_name {
                info!(
                    "Removing stale MCP registration '{}' (url changed to {})",
                    target.name, target.url
                );
                self.exec(self.commands.remove.render(target)).await?;
                report.actions.push(ReconcileAction::Remove);
            }

            info!("Registering MCP server '{}' at {}", target.name, target.url);
            self.exec(self.commands.add.render(target)).await?;
            report.actions.push(ReconcileAction::Add);

            let confirmed = self.exec(self.commands.list.clone()).await?;
            scan = ListScan::of(&confirmed, target);
            if !scan.found_name && !scan.found_url {
                error!(
                    "MCP server '{}' ({}) is missing from the list after adding it",
                    target.name, target.url
                );
                report.warnings.push(ReconciliationWarning::NotConfirmed {
                    target: target.clone(),
                });
            }
        }

        if let Some(line) = scan.matched_line.filter(|l| l.contains(FAILURE_MARKER)) {
            warn!("MCP server '{}' is registered but failing: {}", target.name, line);
            report.warnings.push(ReconciliationWarning::FailureMarker { line });
        }

        Ok(report)
    }

    async fn exec(&self, argv: Vec<String>) -> Result<ProcessResult> {
        let spec = CommandSpec::new(argv)
            .with_cwd(self.cwd.clone())
            .with_env(self.env.clone());
        let result = self.runner.run(&spec).await?;
        if !result.success() {
            warn!(
                "'{}' exited with code {}: {}",
                spec.display(),
                result.exit_code,
                result.stderr_lines.join(" ")
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProcessRunner;
    use crate::testing::{argv, ScriptedRunner};
    use crate::types::AgentDescriptor;
    use pretty_assertions::assert_eq;

    const LIST: &[&str] = &["gemini", "mcp", "list"];

    fn commands() -> RegistrationCommands {
        AgentDescriptor::mcp_subcommands("gemini")
    }

    fn target() -> RegistrationTarget {
        RegistrationTarget::local_sse("ide", 9000)
    }

    fn add_argv() -> Vec<String> {
        argv(&["gemini", "mcp", "add", "--transport", "sse", "ide", "http://localhost:9000/sse"])
    }

    #[tokio::test]
    async fn test_missing_registration_is_added() {
        let runner = ScriptedRunner::new();
        runner.respond_lines(LIST, &["Configured MCP servers:", "  other: http://x/sse"]);
        runner.respond_lines(LIST, &["  ✓ ide: http://localhost:9000/sse (sse)"]);

        let commands = commands();
        let report = RegistrationReconciler::new(runner.as_ref(), &commands)
            .reconcile(&target())
            .await
            .unwrap();

        assert_eq!(report.actions, vec![ReconcileAction::Add]);
        assert!(report.warnings.is_empty());
        assert_eq!(runner.calls(), vec![argv(LIST), add_argv(), argv(LIST)]);
    }

    #[tokio::test]
    async fn test_stale_url_is_removed_then_added() {
        let runner = ScriptedRunner::new();
        runner.respond_lines(LIST, &["  ✓ ide: http://localhost:8000/sse (sse)"]);
        runner.respond_lines(LIST, &["  ✓ ide: http://localhost:9000/sse (sse)"]);

        let commands = commands();
        let report = RegistrationReconciler::new(runner.as_ref(), &commands)
            .reconcile(&target())
            .await
            .unwrap();

        assert_eq!(
            report.actions,
            vec![ReconcileAction::Remove, ReconcileAction::Add]
        );
        assert_eq!(
            runner.calls(),
            vec![
                argv(LIST),
                argv(&["gemini", "mcp", "remove", "ide"]),
                add_argv(),
                argv(LIST),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_marker_reported_without_commands() {
        let runner = ScriptedRunner::new();
        runner.respond_lines(LIST, &["✗ ide: http://localhost:9000/sse (sse) - Disconnected"]);

        let commands = commands();
        let report = RegistrationReconciler::new(runner.as_ref(), &commands)
            .reconcile(&target())
            .await
            .unwrap();

        assert!(report.is_noop());
        assert_eq!(
            report.warnings,
            vec![ReconciliationWarning::FailureMarker {
                line: "✗ ide: http://localhost:9000/sse (sse) - Disconnected".to_string()
            }]
        );
        assert_eq!(runner.calls(), vec![argv(LIST)]);
    }

    #[tokio::test]
    async fn test_unconfirmed_add_is_warned() {
        let runner = ScriptedRunner::new();
        runner.respond_lines(LIST, &["No MCP servers configured."]);

        let commands = commands();
        let report = RegistrationReconciler::new(runner.as_ref(), &commands)
            .reconcile(&target())
            .await
            .unwrap();

        assert_eq!(report.actions, vec![ReconcileAction::Add]);
        assert_eq!(
            report.warnings,
            vec![ReconciliationWarning::NotConfirmed { target: target() }]
        );
    }

    #[tokio::test]
    async fn test_remove_precedes_add() {
        let mut runner = MockProcessRunner::new();
        let mut seq = mockall::Sequence::new();
        runner
            .expect_run()
            .withf(|spec| spec.argv == argv(LIST))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ProcessResult::ok(["ide: http://localhost:1234/sse"])));
        runner
            .expect_run()
            .withf(|spec| spec.argv == argv(&["gemini", "mcp", "remove", "ide"]))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ProcessResult::ok(Vec::<String>::new())));
        runner
            .expect_run()
            .withf(|spec| spec.argv == add_argv())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ProcessResult::ok(Vec::<String>::new())));
        runner
            .expect_run()
            .withf(|spec| spec.argv == argv(LIST))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ProcessResult::ok(["ide: http://localhost:9000/sse"])));

        let commands = commands();
        let report = RegistrationReconciler::new(&runner, &commands)
            .reconcile(&target())
            .await
            .unwrap();

        assert_eq!(
            report.actions,
            vec![ReconcileAction::Remove, ReconcileAction::Add]
        );
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let runner = ScriptedRunner::new();
        runner.respond_lines(LIST, &[]);
        runner.respond_lines(LIST, &["  ✓ ide: http://localhost:9000/sse (sse)"]);

        let commands = commands();
        let reconciler = RegistrationReconciler::new(runner.as_ref(), &commands);
        let first = reconciler.reconcile(&target()).await.unwrap();
        assert_eq!(first.actions, vec![ReconcileAction::Add]);
        let after_first = runner.calls().len();

        let second = reconciler.reconcile(&target()).await.unwrap();

        assert!(second.is_noop());
        assert!(second.warnings.is_empty());
        assert_eq!(runner.calls()[after_first..].to_vec(), vec![argv(LIST)]);
        let adds = runner.calls().iter().filter(|c| **c == add_argv()).count();
        assert_eq!(adds, 1);
    }

    #[tokio::test]
    async fn test_list_launch_failure_is_an_error() {
        let runner = ScriptedRunner::new();
        runner.fail_launch(LIST);

        let commands = commands();
        let result = RegistrationReconciler::new(runner.as_ref(), &commands)
            .reconcile(&target())
            .await;

        assert!(result.is_err());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_commands_use_cwd_and_env() {
        let mut runner = MockProcessRunner::new();
        runner
            .expect_run()
            .withf(|spec| {
                spec.cwd == Some(PathBuf::from("/work"))
                    && spec.env.get("NPM_CONFIG_PREFIX").map(String::as_str) == Some("/opt/npm")
            })
            .times(1)
            .returning(|_| Ok(ProcessResult::ok(["ide http://localhost:9000/sse"])));

        let commands = commands();
        let env = HashMap::from([("NPM_CONFIG_PREFIX".to_string(), "/opt/npm".to_string())]);
        RegistrationReconciler::new(&runner, &commands)
            .with_cwd(Some(PathBuf::from("/work")))
            .with_env(env)
            .reconcile(&target())
            .await
            .unwrap();
    }
}
