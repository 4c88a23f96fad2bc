//! Supervision of a live agent process

use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Default time an agent gets to exit after SIGTERM before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// The agent's protocol pipes, handed to whoever speaks ACP with it
#[derive(Debug)]
pub struct AgentStdio {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// State-side handle of a live agent process.
///
/// The child itself is owned by the matching [`ProcessWatcher`]; this handle
/// can only ask it to stop. Dropping the handle also stops the process.
#[derive(Debug)]
pub struct AgentProcess {
    pid: Option<u32>,
    started_at: chrono::DateTime<chrono::Utc>,
    stdio: Option<AgentStdio>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl AgentProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.started_at
    }

    /// Take the protocol pipes. Only the first caller gets them.
    pub fn take_stdio(&mut self) -> Option<AgentStdio> {
        self.stdio.take()
    }

    /// Close our end of stdin and signal the watcher to terminate the process
    pub fn request_stop(&mut self) {
        self.stdio = None;
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// How an agent process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when killed by a signal or when the status was unavailable
    pub code: Option<i32>,
    /// The exit followed a stop request
    pub stop_requested: bool,
    /// The grace period ran out and the process was killed
    pub forced: bool,
}

impl ExitOutcome {
    fn from_status(status: std::io::Result<ExitStatus>, stop_requested: bool, forced: bool) -> Self {
        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                error!("Failed to wait for agent process: {}", e);
                None
            }
        };
        Self {
            code,
            stop_requested,
            forced,
        }
    }

    pub fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("process exited with code {}", code),
            None => "process was terminated by a signal".to_string(),
        }
    }
}

/// Owns the child process and observes its exit
#[derive(Debug)]
pub struct ProcessWatcher {
    agent_id: String,
    child: Child,
    stop_rx: oneshot::Receiver<()>,
}

impl ProcessWatcher {
    /// Wait until the process exits on its own, or until a stop is requested
    /// and the process has been terminated.
    pub async fn wait(mut self, grace: Duration) -> ExitOutcome {
        tokio::select! {
            status = self.child.wait() => ExitOutcome::from_status(status, false, false),
            _ = &mut self.stop_rx => {
                debug!("Stop requested for agent {}", self.agent_id);
                terminate(&mut self.child, grace, &self.agent_id).await
            }
        }
    }
}

/// Split a freshly spawned child into a state-side handle and its watcher.
/// stderr is drained into the log so the agent cannot stall on a full pipe.
pub fn supervise(agent_id: &str, mut child: Child) -> (AgentProcess, ProcessWatcher) {
    let stdio = match (child.stdin.take(), child.stdout.take()) {
        (Some(stdin), Some(stdout)) => Some(AgentStdio { stdin, stdout }),
        _ => None,
    };

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(drain_stderr(agent_id.to_string(), stderr));
    }

    let (stop_tx, stop_rx) = oneshot::channel();
    let process = AgentProcess {
        pid: child.id(),
        started_at: chrono::Utc::now(),
        stdio,
        stop_tx: Some(stop_tx),
    };
    let watcher = ProcessWatcher {
        agent_id: agent_id.to_string(),
        child,
        stop_rx,
    };
    (process, watcher)
}

/// Terminate a child: SIGTERM first, then kill once the grace period is over
pub async fn terminate(child: &mut Child, grace: Duration, agent_id: &str) -> ExitOutcome {
    match child.try_wait() {
        Ok(Some(status)) => return ExitOutcome::from_status(Ok(status), true, false),
        Ok(None) => {}
        Err(e) => warn!("Failed to poll agent {}: {}", agent_id, e),
    }

    send_terminate(child, agent_id);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => ExitOutcome::from_status(status, true, false),
        Err(_) => {
            warn!(
                "Agent {} did not exit within {}s, killing it",
                agent_id,
                grace.as_secs_f32()
            );
            if let Err(e) = child.kill().await {
                error!("Failed to kill agent {}: {}", agent_id, e);
            }
            ExitOutcome::from_status(child.wait().await, true, true)
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child, agent_id: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("Failed to send SIGTERM to agent {}: {}", agent_id, e);
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _agent_id: &str) {
    let _ = child.start_kill();
}

async fn drain_stderr(agent_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    // Agents log here routinely; it is not an error signal.
                    debug!("[{}] stderr: {}", agent_id, trimmed);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading stderr of {}: {}", agent_id, e);
                break;
            }
        }
    }
    debug!("Agent {} stderr closed", agent_id);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::{ProcessRunner, TokioProcessRunner};
    use crate::types::CommandSpec;

    fn spawn(argv: &[&str]) -> Child {
        TokioProcessRunner::new()
            .spawn(&CommandSpec::new(argv.iter().copied()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_watcher_reports_natural_exit() {
        let (_process, watcher) = supervise("test", spawn(&["sh", "-c", "exit 7"]));
        let outcome = watcher.wait(DEFAULT_STOP_GRACE).await;

        assert_eq!(outcome.code, Some(7));
        assert!(!outcome.stop_requested);
        assert!(!outcome.forced);
    }

    #[tokio::test]
    async fn test_stop_request_terminates_process() {
        let (mut process, watcher) = supervise("test", spawn(&["sleep", "30"]));
        assert!(process.pid().is_some());

        let task = tokio::spawn(watcher.wait(Duration::from_secs(5)));
        process.request_stop();
        let outcome = task.await.unwrap();

        assert!(outcome.stop_requested);
        assert!(!outcome.forced);
    }

    #[tokio::test]
    async fn test_ignored_sigterm_is_forced() {
        let (mut process, watcher) = supervise(
            "test",
            spawn(&["sh", "-c", "trap '' TERM; sleep 30"]),
        );
        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let task = tokio::spawn(watcher.wait(Duration::from_millis(300)));
        process.request_stop();
        let outcome = task.await.unwrap();

        assert!(outcome.stop_requested);
        assert!(outcome.forced);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_process() {
        let (process, watcher) = supervise("test", spawn(&["sleep", "30"]));
        let task = tokio::spawn(watcher.wait(Duration::from_secs(5)));
        drop(process);

        let outcome = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.stop_requested);
    }

    #[tokio::test]
    async fn test_stdio_taken_once() {
        let (mut process, watcher) = supervise("test", spawn(&["cat"]));
        assert!(process.take_stdio().is_some());
        assert!(process.take_stdio().is_none());

        let task = tokio::spawn(watcher.wait(Duration::from_secs(5)));
        process.request_stop();
        task.await.unwrap();
    }
}
