//! External command execution

use crate::error::{Error, ProcessError, Result};
use crate::types::{CommandSpec, ProcessResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Default timeout for short-lived commands (version, update, mcp list/add/remove)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// How long output is still collected after the command itself has exited.
/// A background child it left behind may keep the pipes open.
const OUTPUT_DRAIN: Duration = Duration::from_secs(1);

/// Runs external commands on behalf of agent services.
///
/// The production implementation uses tokio; tests substitute canned results
/// without touching the system.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion, capturing stdout and stderr line by line.
    ///
    /// A non-zero exit code is a normal result. An error means the command
    /// could not be launched (or waited on).
    async fn run(&self, command: &CommandSpec) -> Result<ProcessResult>;

    /// Launch a long-lived process with piped stdio and return immediately.
    /// The caller owns the child from here on.
    fn spawn(&self, command: &CommandSpec) -> Result<Child>;
}

/// Production runner backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct TokioProcessRunner {
    timeout: Duration,
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_COMMAND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a `Command` from a spec. The parent's environment is inherited so
/// API keys reach the agent untouched.
fn build_command(spec: &CommandSpec) -> Result<(String, Command)> {
    let (program, args) = spec
        .argv
        .split_first()
        .ok_or(Error::Process(ProcessError::EmptyCommand))?;

    let mut cmd = Command::new(program);
    cmd.args(args).envs(&spec.env);

    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }

    Ok((program.clone(), cmd))
}

fn launch_error(program: &str, source: std::io::Error) -> Error {
    Error::Process(ProcessError::LaunchFailed {
        program: program.to_string(),
        source,
    })
}

/// Collect a pipe line by line until EOF
async fn read_lines<R: AsyncRead + Unpin>(pipe: Option<R>, lines: &mut Vec<String>) {
    let Some(pipe) = pipe else {
        return;
    };
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                lines.push(line.trim_end_matches(&['\n', '\r'][..]).to_string());
            }
            Err(e) => {
                warn!("Failed to read command output: {}", e);
                break;
            }
        }
    }
}

/// Wait for the child while collecting its output.
///
/// Output is read concurrently with wait() so a chatty command cannot block
/// on a full pipe. Once the child has exited, whatever is still unread after
/// [`OUTPUT_DRAIN`] is dropped.
async fn wait_with_output(child: &mut Child, program: &str) -> Result<ProcessResult> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut stdout_lines = Vec::new();
    let mut stderr_lines = Vec::new();

    let status = {
        let output = async {
            tokio::join!(
                read_lines(stdout, &mut stdout_lines),
                read_lines(stderr, &mut stderr_lines)
            )
        };
        tokio::pin!(output);

        let (status, drained) = tokio::select! {
            status = child.wait() => (status, false),
            _ = &mut output => (child.wait().await, true),
        };
        if !drained && tokio::time::timeout(OUTPUT_DRAIN, &mut output).await.is_err() {
            warn!("{} exited but left its output open, ignoring the rest", program);
        }
        status
    };

    let status = status.map_err(|source| {
        Error::Process(ProcessError::Wait {
            program: program.to_string(),
            source,
        })
    })?;
    Ok(ProcessResult::new(
        status.code().unwrap_or(-1),
        stdout_lines,
        stderr_lines,
    ))
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessResult> {
        let (program, mut cmd) = build_command(command)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running command: {} (cwd: {:?})", command.display(), command.cwd);

        let mut child = cmd.spawn().map_err(|e| launch_error(&program, e))?;

        tokio::select! {
            result = wait_with_output(&mut child, &program) => result,
            () = tokio::time::sleep(self.timeout) => {
                let _ = child.kill().await;
                Err(Error::Process(ProcessError::TimedOut {
                    program: program.clone(),
                    timeout: self.timeout,
                }))
            }
        }
    }

    fn spawn(&self, command: &CommandSpec) -> Result<Child> {
        let (program, mut cmd) = build_command(command)?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| launch_error(&program, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_run_missing_executable_is_launch_error() {
        let runner = TokioProcessRunner::new();
        let result = runner
            .run(&CommandSpec::new(["nonexistent_command_12345", "--version"]))
            .await;

        match result {
            Err(Error::Process(ProcessError::LaunchFailed { program, .. })) => {
                assert_eq!(program, "nonexistent_command_12345");
            }
            other => panic!("Expected LaunchFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_empty_command() {
        let runner = TokioProcessRunner::new();
        let result = runner.run(&CommandSpec::default()).await;
        assert!(matches!(
            result,
            Err(Error::Process(ProcessError::EmptyCommand))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_streams_and_exit_code() {
        let runner = TokioProcessRunner::new();
        let result = runner
            .run(&CommandSpec::new([
                "sh",
                "-c",
                "echo one; echo two; echo oops >&2; exit 3",
            ]))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout_lines, vec!["one", "two"]);
        assert_eq!(result.stderr_lines, vec!["oops"]);
        assert!(!result.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_uses_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioProcessRunner::new();
        let spec = CommandSpec::new(["pwd"]).with_cwd(Some(dir.path().to_path_buf()));

        let result = runner.run(&spec).await.unwrap();
        let reported = std::path::PathBuf::from(result.first_line().unwrap());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_passes_extra_env() {
        let runner = TokioProcessRunner::new();
        let mut env = std::collections::HashMap::new();
        env.insert("ACPVISOR_TEST_VALUE".to_string(), "hello".to_string());
        let spec = CommandSpec::new(["sh", "-c", "echo $ACPVISOR_TEST_VALUE"]).with_env(env);

        let result = runner.run(&spec).await.unwrap();
        assert_eq!(result.first_line(), Some("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let runner = TokioProcessRunner::with_timeout(Duration::from_millis(100));
        let result = runner.run(&CommandSpec::new(["sleep", "5"])).await;
        assert!(matches!(
            result,
            Err(Error::Process(ProcessError::TimedOut { .. }))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_returns_when_background_child_keeps_output_open() {
        let runner = TokioProcessRunner::with_timeout(Duration::from_secs(10));
        let started = std::time::Instant::now();
        let result = runner
            .run(&CommandSpec::new(["sh", "-c", "echo done; sleep 5 &"]))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout_lines, vec!["done"]);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let runner = TokioProcessRunner::new();
        let result = runner.spawn(&CommandSpec::new(["nonexistent_command_12345"]));
        assert!(matches!(
            result,
            Err(Error::Process(ProcessError::LaunchFailed { .. }))
        ));
    }
}
