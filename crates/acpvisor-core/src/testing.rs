//! Test doubles shared across modules

use crate::error::{Error, ProcessError, Result};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::types::{CommandSpec, ProcessResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Semaphore;

#[derive(Clone)]
enum Scripted {
    Output(ProcessResult),
    LaunchError,
}

/// Runner with canned `run` results keyed by argv.
///
/// Responses for one argv are consumed in order; the last one repeats.
/// Unscripted commands succeed with no output. `spawn` launches real
/// processes so tests can supervise `sleep` and friends.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    responses: Mutex<HashMap<Vec<String>, VecDeque<Scripted>>>,
    gates: Mutex<HashMap<Vec<String>, Arc<Semaphore>>>,
    calls: Mutex<Vec<Vec<String>>>,
    spawned: Mutex<Vec<CommandSpec>>,
    pids: Mutex<Vec<u32>>,
    spawn_gate: Mutex<Option<mpsc::Receiver<()>>>,
    real: TokioProcessRunner,
}

pub(crate) fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, command: &[&str], result: ProcessResult) {
        self.push(command, Scripted::Output(result));
    }

    pub fn respond_lines(&self, command: &[&str], lines: &[&str]) {
        self.respond(command, ProcessResult::ok(lines.iter().copied()));
    }

    pub fn fail_launch(&self, command: &[&str]) {
        self.push(command, Scripted::LaunchError);
    }

    fn push(&self, command: &[&str], scripted: Scripted) {
        self.responses
            .lock()
            .entry(argv(command))
            .or_default()
            .push_back(scripted);
    }

    /// Block `run(command)` until [`Semaphore::add_permits`] is called on the
    /// returned gate
    pub fn hold(&self, command: &[&str]) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(argv(command), Arc::clone(&gate));
        gate
    }

    /// Block the next `spawn` after the process has started, until the
    /// returned sender is used or dropped. `spawn` is synchronous, so this
    /// parks the calling worker thread; use a multi-thread runtime.
    pub fn hold_spawn(&self) -> mpsc::Sender<()> {
        let (release, gate) = mpsc::channel();
        *self.spawn_gate.lock() = Some(gate);
        release
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, command: &[&str]) -> usize {
        let wanted = argv(command);
        self.calls.lock().iter().filter(|c| **c == wanted).count()
    }

    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.spawned.lock().clone()
    }

    /// Pids of the processes started through `spawn`, in order
    pub fn spawned_pids(&self) -> Vec<u32> {
        self.pids.lock().clone()
    }

    /// Wait until `command` has been run at least once
    pub async fn wait_for_call(&self, command: &[&str]) {
        for _ in 0..500 {
            if self.call_count(command) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{:?} was never run", command);
    }

    fn next_response(&self, command: &[String]) -> Option<Scripted> {
        let mut responses = self.responses.lock();
        let queue = responses.get_mut(command)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Poll `check` until it holds, panicking after five seconds
pub(crate) async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<ProcessResult> {
        self.calls.lock().push(command.argv.clone());

        let gate = self.gates.lock().get(&command.argv).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        match self.next_response(&command.argv) {
            Some(Scripted::Output(result)) => Ok(result),
            Some(Scripted::LaunchError) => Err(Error::Process(ProcessError::LaunchFailed {
                program: command.program().unwrap_or_default().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted launch failure"),
            })),
            None => Ok(ProcessResult::ok(Vec::<String>::new())),
        }
    }

    fn spawn(&self, command: &CommandSpec) -> Result<Child> {
        self.spawned.lock().push(command.clone());
        let child = self.real.spawn(command)?;
        if let Some(pid) = child.id() {
            self.pids.lock().push(pid);
        }

        let gate = self.spawn_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        Ok(child)
    }
}
