//! Lifecycle of one agent
//!
//! ```text
//!            schedule()
//!   Idle ─────────────► Scheduled ──► CheckingUpdates ──► Starting ──► Running
//!   Stopped ◄──┐                 │            │               │           │
//!   Failed     │                 └── stop() ──┴──── stop() ───┘        stop()
//!              │                                   │                      │
//!              └───────────────────────────────────┴──── Stopped ◄── Stopping
//!
//!   update/launch failure ──► Failed       unexpected exit ──► Failed
//! ```
//!
//! Transitions happen under the state lock; listeners are notified after it
//! is released. A published transition holds the events lock from before the
//! state change until its listeners have returned, so events reach listeners
//! in transition order and `stop()` returns only after `Stopped` was delivered.

use super::context::ServiceContext;
use super::reconciler::ReconcileReport;
use super::updater::UpdateCheck;
use crate::error::{AgentError, Error, Result};
use crate::preferences::{keys, Preferences};
use crate::process::{self, AgentProcess, AgentStdio, ExitOutcome};
use crate::types::{
    AgentDescriptor, AgentSnapshot, CommandSpec, FailureReason, FailureStatus, LifecycleEvent,
    LifecyclePhase,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reported by [`AgentService::version`] when the version is unavailable
pub const VERSION_NOT_FOUND: &str = "Not found";

#[derive(Debug, Default)]
struct RuntimeState {
    phase: LifecyclePhase,
    /// Identifies the current schedule attempt; stale completions are ignored
    attempt: Option<Uuid>,
    /// Present exactly while the phase is Running or Stopping
    process: Option<AgentProcess>,
    last_failure: Option<FailureStatus>,
    effective_startup_command: Option<Vec<String>>,
    /// stop() arrived while the attempt was still in flight
    cancel_requested: bool,
}

/// Owns the lifecycle of one agent process
pub struct AgentService {
    descriptor: Arc<AgentDescriptor>,
    ctx: ServiceContext,
    state: Mutex<RuntimeState>,
    /// Always taken before `state`. Reentrant so listeners may call back in.
    events: ReentrantMutex<()>,
    phase_tx: watch::Sender<LifecyclePhase>,
}

impl AgentService {
    pub fn new(descriptor: AgentDescriptor, ctx: ServiceContext) -> Self {
        let (phase_tx, _) = watch::channel(LifecyclePhase::Idle);
        Self {
            descriptor: Arc::new(descriptor),
            ctx,
            state: Mutex::new(RuntimeState::default()),
            events: ReentrantMutex::new(()),
            phase_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn display_name(&self) -> &str {
        &self.descriptor.display_name
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.state.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.phase() == LifecyclePhase::Running
    }

    /// Scheduled, checking for updates, or starting
    pub fn is_scheduled(&self) -> bool {
        self.phase().is_scheduling()
    }

    pub fn last_failure(&self) -> Option<FailureStatus> {
        self.state.lock().last_failure.clone()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        let state = self.state.lock();
        AgentSnapshot {
            id: self.descriptor.id.clone(),
            display_name: self.descriptor.display_name.clone(),
            phase: state.phase,
            pid: state.process.as_ref().and_then(AgentProcess::pid),
            effective_startup_command: state.effective_startup_command.clone(),
            last_failure: state.last_failure.clone(),
            started_at: state.process.as_ref().map(AgentProcess::started_at),
        }
    }

    /// Startup command as it would be resolved right now: the user override
    /// if one is set, else the descriptor default.
    pub fn startup_command(&self) -> Vec<String> {
        self.ctx
            .preferences
            .get_string_list(&keys::startup_command(&self.descriptor.id))
            .unwrap_or_else(|| self.descriptor.default_startup_command.clone())
    }

    /// Take the running agent's protocol pipes. Only the first caller after a
    /// start gets them.
    pub fn take_stdio(&self) -> Option<AgentStdio> {
        self.state.lock().process.as_mut().and_then(AgentProcess::take_stdio)
    }

    /// Begin an asynchronous start attempt and return immediately.
    ///
    /// The startup command is resolved now; preference changes made after
    /// this call do not affect the attempt.
    pub fn schedule(self: &Arc<Self>) -> Result<()> {
        let startup = self.startup_command();
        let attempt = Uuid::new_v4();
        let _events = self.events.lock();
        {
            let mut state = self.state.lock();
            match state.phase {
                phase if phase.is_scheduling() => {
                    return Err(AgentError::AlreadyScheduling(self.descriptor.id.clone()).into())
                }
                LifecyclePhase::Running => {
                    return Err(AgentError::AlreadyRunning(self.descriptor.id.clone()).into())
                }
                LifecyclePhase::Stopping => {
                    return Err(AgentError::Stopping(self.descriptor.id.clone()).into())
                }
                _ => {}
            }
            state.attempt = Some(attempt);
            state.cancel_requested = false;
            state.last_failure = None;
            state.effective_startup_command = Some(startup.clone());
            self.set_phase(&mut state, LifecyclePhase::Scheduled);
        }

        info!("Scheduled {} (attempt {})", self.descriptor.display_name, attempt);
        self.publish(LifecycleEvent::Scheduled {
            agent_id: self.descriptor.id.clone(),
        });

        let service = Arc::clone(self);
        self.ctx.runtime().spawn(async move {
            service.run_attempt(attempt, startup).await;
        });
        Ok(())
    }

    /// Stop the agent and wait until it has settled.
    ///
    /// A running process gets SIGTERM, then a kill once the grace period is
    /// over. An attempt still in flight is cancelled at its next checkpoint,
    /// terminating the process if it was just spawned.
    pub async fn stop(&self) -> Result<()> {
        let mut phase_rx = self.phase_tx.subscribe();
        {
            let mut state = self.state.lock();
            match state.phase {
                LifecyclePhase::Idle | LifecyclePhase::Stopped | LifecyclePhase::Failed => {
                    return Err(AgentError::NotRunning(self.descriptor.id.clone()).into());
                }
                LifecyclePhase::Scheduled
                | LifecyclePhase::CheckingUpdates
                | LifecyclePhase::Starting => {
                    info!(
                        "Cancelling start of {} ({})",
                        self.descriptor.display_name, state.phase
                    );
                    state.cancel_requested = true;
                }
                LifecyclePhase::Running => {
                    info!("Stopping {}", self.descriptor.display_name);
                    if let Some(process) = state.process.as_mut() {
                        process.request_stop();
                    }
                    self.set_phase(&mut state, LifecyclePhase::Stopping);
                }
                LifecyclePhase::Stopping => {
                    debug!("{} is already stopping", self.descriptor.display_name);
                }
            }
        }

        phase_rx
            .wait_for(|phase| phase.is_settled())
            .await
            .map_err(|_| Error::Internal("lifecycle channel closed".to_string()))?;
        self.await_delivery();
        Ok(())
    }

    /// Wait until the phase is Idle, Running, Stopped or Failed
    pub async fn wait_until_settled(&self) -> LifecyclePhase {
        let mut phase_rx = self.phase_tx.subscribe();
        let settled = match phase_rx.wait_for(|phase| phase.is_settled()).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        };
        self.await_delivery();
        settled
    }

    /// Block until listeners of the transition just observed have returned
    fn await_delivery(&self) {
        drop(self.events.lock());
    }

    /// Installed version of the agent CLI, or [`VERSION_NOT_FOUND`]
    pub async fn version(&self) -> String {
        let spec = agent_command(
            &self.descriptor,
            self.ctx.preferences.as_ref(),
            self.descriptor.version_command.clone(),
        );
        match self.ctx.runner.run(&spec).await {
            Ok(result) if result.success() => {
                if let Some(line) = result.first_line() {
                    return line.to_string();
                }
                debug!("'{}' printed nothing", spec.display());
            }
            Ok(result) => {
                debug!("'{}' exited with code {}", spec.display(), result.exit_code);
            }
            Err(e) => {
                debug!("Error getting {} version: {}", self.descriptor.display_name, e);
            }
        }
        VERSION_NOT_FOUND.to_string()
    }

    /// Converge this agent's MCP registration to the configured server,
    /// independently of any start attempt
    pub async fn reconcile_registration(&self) -> Result<Option<ReconcileReport>> {
        UpdateCheck::new(&self.descriptor, &self.ctx)
            .reconcile_registration()
            .await
    }

    async fn run_attempt(self: Arc<Self>, attempt: Uuid, startup: Vec<String>) {
        if !self.advance(attempt, LifecyclePhase::CheckingUpdates) {
            return;
        }

        if let Err(e) = UpdateCheck::new(&self.descriptor, &self.ctx).run(&startup).await {
            let status = FailureStatus::new(&self.descriptor.id, FailureReason::UpdateCheck, e.to_string());
            self.fail(attempt, status);
            return;
        }

        if !self.advance(attempt, LifecyclePhase::Starting) {
            return;
        }
        self.launch(attempt, startup).await;
    }

    async fn launch(self: &Arc<Self>, attempt: Uuid, startup: Vec<String>) {
        self.warn_missing_env();
        let spec = agent_command(&self.descriptor, self.ctx.preferences.as_ref(), startup);
        info!("Launching {}: {:?}", self.descriptor.display_name, spec.argv);

        let child = match self.ctx.runner.spawn(&spec) {
            Ok(child) => child,
            Err(e) => {
                let status = FailureStatus::new(&self.descriptor.id, FailureReason::ProcessLaunch, e.to_string());
                self.fail(attempt, status);
                return;
            }
        };

        let (process, watcher) = process::supervise(&self.descriptor.id, child);

        if let Some(mut process) = self.enter_running(attempt, process) {
            info!(
                "Stop was requested while {} was starting, terminating it",
                self.descriptor.display_name
            );
            process.request_stop();
            watcher.wait(self.ctx.stop_grace).await;
            self.finish_stopped(attempt);
            return;
        }

        // Weak, so dropping the service drops the process handle and stops it
        let service = Arc::downgrade(self);
        let grace = self.ctx.stop_grace;
        self.ctx.runtime().spawn(async move {
            let exit = watcher.wait(grace).await;
            if let Some(service) = Weak::upgrade(&service) {
                service.on_exit(attempt, exit);
            }
        });
    }

    /// Hand the spawned process to the service and enter Running. Gives the
    /// process back when the attempt was cancelled or superseded meanwhile.
    fn enter_running(&self, attempt: Uuid, process: AgentProcess) -> Option<AgentProcess> {
        let _events = self.events.lock();
        let pid = process.pid();
        {
            let mut state = self.state.lock();
            if state.attempt != Some(attempt) || state.cancel_requested {
                return Some(process);
            }
            state.process = Some(process);
            self.set_phase(&mut state, LifecyclePhase::Running);
        }

        info!("{} is running (pid {:?})", self.descriptor.display_name, pid);
        self.publish(LifecycleEvent::Started {
            agent_id: self.descriptor.id.clone(),
            pid,
        });
        None
    }

    /// Enter `next` unless the attempt was cancelled or superseded.
    /// Returns whether the attempt should continue.
    fn advance(&self, attempt: Uuid, next: LifecyclePhase) -> bool {
        let _events = self.events.lock();
        {
            let mut state = self.state.lock();
            if state.attempt != Some(attempt) {
                return false;
            }
            if !state.cancel_requested {
                self.set_phase(&mut state, next);
                return true;
            }
            self.settle_stopped(&mut state);
        }
        info!("Start of {} cancelled", self.descriptor.display_name);
        self.publish(LifecycleEvent::Stopped {
            agent_id: self.descriptor.id.clone(),
        });
        false
    }

    fn fail(&self, attempt: Uuid, status: FailureStatus) {
        let _events = self.events.lock();
        let failed = {
            let mut state = self.state.lock();
            if state.attempt != Some(attempt) {
                return;
            }
            if state.cancel_requested {
                self.settle_stopped(&mut state);
                None
            } else {
                state.process = None;
                state.last_failure = Some(status.clone());
                self.set_phase(&mut state, LifecyclePhase::Failed);
                Some(status)
            }
        };

        match failed {
            Some(status) => {
                error!("{} failed: {}", self.descriptor.display_name, status);
                self.publish(LifecycleEvent::Failed {
                    agent_id: self.descriptor.id.clone(),
                    status,
                });
            }
            None => self.publish(LifecycleEvent::Stopped {
                agent_id: self.descriptor.id.clone(),
            }),
        }
    }

    fn finish_stopped(&self, attempt: Uuid) {
        let _events = self.events.lock();
        {
            let mut state = self.state.lock();
            if state.attempt != Some(attempt) {
                return;
            }
            self.settle_stopped(&mut state);
        }
        info!("{} stopped", self.descriptor.display_name);
        self.publish(LifecycleEvent::Stopped {
            agent_id: self.descriptor.id.clone(),
        });
    }

    fn on_exit(&self, attempt: Uuid, exit: ExitOutcome) {
        let _events = self.events.lock();
        let event = {
            let mut state = self.state.lock();
            if state.attempt != Some(attempt) {
                debug!("Ignoring exit of a previous {} process", self.descriptor.display_name);
                return;
            }
            if state.phase == LifecyclePhase::Stopping || exit.stop_requested {
                self.settle_stopped(&mut state);
                LifecycleEvent::Stopped {
                    agent_id: self.descriptor.id.clone(),
                }
            } else {
                let status = FailureStatus::new(
                    &self.descriptor.id,
                    FailureReason::UnexpectedExit,
                    format!("{} {}", self.descriptor.display_name, exit.describe()),
                )
                .with_exit_code(exit.code);
                state.process = None;
                state.last_failure = Some(status.clone());
                self.set_phase(&mut state, LifecyclePhase::Failed);
                LifecycleEvent::Failed {
                    agent_id: self.descriptor.id.clone(),
                    status,
                }
            }
        };

        match &event {
            LifecycleEvent::Failed { status, .. } => {
                error!("{} exited unexpectedly: {}", self.descriptor.display_name, status)
            }
            _ if exit.forced => warn!(
                "{} ignored SIGTERM and was killed",
                self.descriptor.display_name
            ),
            _ => info!("{} stopped", self.descriptor.display_name),
        }
        self.publish(event);
    }

    fn settle_stopped(&self, state: &mut RuntimeState) {
        state.process = None;
        state.cancel_requested = false;
        self.set_phase(state, LifecyclePhase::Stopped);
    }

    fn set_phase(&self, state: &mut RuntimeState, phase: LifecyclePhase) {
        debug!("{}: {} -> {}", self.descriptor.id, state.phase, phase);
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn publish(&self, event: LifecycleEvent) {
        self.ctx.notifier.publish(self, event);
    }

    fn warn_missing_env(&self) {
        for name in &self.descriptor.required_env {
            if std::env::var_os(name).is_none() && !self.descriptor.env.contains_key(name) {
                warn!(
                    "{} expects {} in its environment, but it is not set",
                    self.descriptor.display_name, name
                );
            }
        }
    }
}

impl std::fmt::Debug for AgentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentService")
            .field("id", &self.descriptor.id)
            .field("phase", &self.phase())
            .finish()
    }
}

/// Command line run on behalf of an agent: working directory from the
/// preferences, extra environment from the descriptor
pub(super) fn agent_command(
    descriptor: &AgentDescriptor,
    prefs: &dyn Preferences,
    argv: Vec<String>,
) -> CommandSpec {
    CommandSpec::new(argv)
        .with_cwd(prefs.get_path(keys::WORKING_DIR))
        .with_env(descriptor.env.clone())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::agent::AgentServiceListener;
    use crate::preferences::PreferenceStore;
    use crate::testing::{argv, eventually, ScriptedRunner};
    use crate::types::{ProcessResult, UpdatePolicy};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::broadcast;

    const UPDATE: &[&str] = &["agent-update"];

    fn alive(pid: u32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
    }

    struct Harness {
        runner: Arc<ScriptedRunner>,
        prefs: Arc<PreferenceStore>,
        service: Arc<AgentService>,
    }

    fn harness(descriptor: AgentDescriptor) -> Harness {
        let runner = ScriptedRunner::new();
        let prefs = Arc::new(PreferenceStore::new());
        prefs.set(
            keys::WORKING_DIR,
            Value::String(std::env::temp_dir().display().to_string()),
        );
        let ctx = ServiceContext::new(runner.clone(), prefs.clone())
            .unwrap()
            .with_stop_grace(Duration::from_secs(2));
        Harness {
            runner,
            prefs,
            service: Arc::new(AgentService::new(descriptor, ctx)),
        }
    }

    fn sleeper() -> AgentDescriptor {
        AgentDescriptor::new("sleeper", "Sleeper", argv(&["sleep", "30"]))
            .with_update_command(argv(UPDATE), UpdatePolicy::Required)
    }

    async fn next_event(
        rx: &mut broadcast::Receiver<LifecycleEvent>,
        wanted: impl Fn(&LifecycleEvent) -> bool,
    ) -> LifecycleEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.unwrap();
                if wanted(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for lifecycle event")
    }

    #[tokio::test]
    async fn test_schedule_reaches_running_then_stops() {
        let h = harness(sleeper());

        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);

        let snapshot = h.service.snapshot();
        assert!(snapshot.pid.is_some());
        assert_eq!(snapshot.effective_startup_command, Some(argv(&["sleep", "30"])));
        assert_eq!(h.runner.calls(), vec![argv(UPDATE)]);
        assert_eq!(h.runner.spawned()[0].cwd, Some(std::env::temp_dir()));

        h.service.stop().await.unwrap();
        assert_eq!(h.service.phase(), LifecyclePhase::Stopped);
        assert!(h.service.snapshot().pid.is_none());
    }

    #[tokio::test]
    async fn test_second_schedule_rejected_while_in_flight() {
        let h = harness(sleeper());
        let gate = h.runner.hold(UPDATE);

        h.service.schedule().unwrap();
        h.runner.wait_for_call(UPDATE).await;

        let err = h.service.schedule().unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::AlreadyScheduling(_))));
        assert_eq!(h.service.phase(), LifecyclePhase::CheckingUpdates);
        assert!(h.service.is_scheduled());

        gate.add_permits(1);
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);

        let err = h.service.schedule().unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::AlreadyRunning(_))));
        assert_eq!(h.runner.spawned().len(), 1);

        h.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_during_update_check_never_spawns() {
        let h = harness(sleeper());
        let gate = h.runner.hold(UPDATE);
        let mut events = h.service.ctx.notifier.subscribe();

        h.service.schedule().unwrap();
        h.runner.wait_for_call(UPDATE).await;

        let stop = h.service.stop();
        tokio::pin!(stop);
        assert!(futures::poll!(&mut stop).is_pending());

        // One permit for this attempt, one for the restart below
        gate.add_permits(2);
        stop.await.unwrap();

        assert_eq!(h.service.phase(), LifecyclePhase::Stopped);
        assert!(h.runner.spawned().is_empty());
        next_event(&mut events, |e| matches!(e, LifecycleEvent::Stopped { .. })).await;

        // A new attempt is accepted straight away
        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);
        h.service.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_after_spawn_terminates_new_process() {
        let h = harness(sleeper());
        let release = h.runner.hold_spawn();
        let mut events = h.service.ctx.notifier.subscribe();

        h.service.schedule().unwrap();
        eventually("the agent to be spawned", || !h.runner.spawned_pids().is_empty()).await;
        let pid = h.runner.spawned_pids()[0];
        assert_eq!(h.service.phase(), LifecyclePhase::Starting);

        let stop = h.service.stop();
        tokio::pin!(stop);
        assert!(futures::poll!(&mut stop).is_pending());

        drop(release);
        stop.await.unwrap();

        assert_eq!(h.service.phase(), LifecyclePhase::Stopped);
        assert!(h.service.snapshot().pid.is_none());
        eventually("the spawned agent to exit", || !alive(pid)).await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(!seen.iter().any(|e| matches!(e, LifecycleEvent::Started { .. })));
        assert!(matches!(seen.last(), Some(LifecycleEvent::Stopped { .. })));
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_not_running() {
        let h = harness(sleeper());
        let err = h.service.stop().await.unwrap_err();
        assert!(matches!(err, Error::Agent(AgentError::NotRunning(_))));
        assert_eq!(h.service.phase(), LifecyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_custom_startup_command_skips_update() {
        let h = harness(sleeper());
        h.prefs.set(
            &keys::startup_command("sleeper"),
            Value::String("sleep 31".to_string()),
        );

        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);

        assert_eq!(h.runner.call_count(UPDATE), 0);
        assert_eq!(h.runner.spawned()[0].argv, argv(&["sleep", "31"]));
        h.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_command_resolved_at_schedule_time() {
        let h = harness(sleeper());
        let gate = h.runner.hold(UPDATE);

        h.service.schedule().unwrap();
        h.runner.wait_for_call(UPDATE).await;
        h.prefs.set(
            &keys::startup_command("sleeper"),
            Value::String("sleep 45".to_string()),
        );
        gate.add_permits(1);

        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);
        assert_eq!(h.runner.spawned()[0].argv, argv(&["sleep", "30"]));
        h.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_required_update_failure_fails_attempt() {
        let h = harness(sleeper());
        h.runner.respond(UPDATE, ProcessResult::new(2, vec![], vec![]));

        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Failed);

        let failure = h.service.last_failure().unwrap();
        assert_eq!(failure.reason, FailureReason::UpdateCheck);
        assert!(!failure.message.is_empty());
        assert!(h.runner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_best_effort_update_failure_still_starts() {
        let h = harness(sleeper().with_update_command(argv(UPDATE), UpdatePolicy::BestEffort));
        h.runner.respond(UPDATE, ProcessResult::new(2, vec![], vec![]));

        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);
        h.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported() {
        let h = harness(AgentDescriptor::new(
            "ghost",
            "Ghost",
            argv(&["/nonexistent/acpvisor-agent"]),
        ));
        let mut events = h.service.ctx.notifier.subscribe();

        h.service.schedule().unwrap();
        let event = next_event(&mut events, |e| matches!(e, LifecycleEvent::Failed { .. })).await;

        let LifecycleEvent::Failed { status, .. } = event else {
            unreachable!()
        };
        assert_eq!(status.reason, FailureReason::ProcessLaunch);
        assert_eq!(h.service.phase(), LifecyclePhase::Failed);
        assert!(h.service.snapshot().pid.is_none());

        // Failed agents can be scheduled again
        h.service.schedule().unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_exit_is_failure_with_code() {
        let h = harness(AgentDescriptor::new(
            "crasher",
            "Crasher",
            argv(&["sh", "-c", "sleep 0.2; exit 3"]),
        ));
        let mut events = h.service.ctx.notifier.subscribe();

        h.service.schedule().unwrap();
        next_event(&mut events, |e| matches!(e, LifecycleEvent::Started { .. })).await;
        let event = next_event(&mut events, |e| matches!(e, LifecycleEvent::Failed { .. })).await;

        let LifecycleEvent::Failed { status, .. } = event else {
            unreachable!()
        };
        assert_eq!(status.reason, FailureReason::UnexpectedExit);
        assert_eq!(status.exit_code, Some(3));
        assert_eq!(h.service.phase(), LifecyclePhase::Failed);
        assert!(matches!(
            h.service.stop().await,
            Err(Error::Agent(AgentError::NotRunning(_)))
        ));
    }

    struct LivenessCheck {
        saw_live_process: Arc<Mutex<Option<bool>>>,
    }

    impl AgentServiceListener for LivenessCheck {
        fn agent_started(&self, agent: &AgentService) {
            let live = agent.is_running() && agent.snapshot().pid.is_some();
            *self.saw_live_process.lock() = Some(live);
        }
    }

    #[tokio::test]
    async fn test_started_listener_sees_live_process() {
        let h = harness(sleeper());
        let seen = Arc::new(Mutex::new(None));
        h.service.ctx.notifier.add_listener(Arc::new(LivenessCheck {
            saw_live_process: Arc::clone(&seen),
        }));

        h.service.schedule().unwrap();
        h.service.wait_until_settled().await;

        assert_eq!(*seen.lock(), Some(true));
        h.service.stop().await.unwrap();
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
    }

    impl AgentServiceListener for Recorder {
        fn agent_scheduled(&self, _agent: &AgentService) {
            self.seen.lock().push("scheduled");
        }

        fn agent_started(&self, _agent: &AgentService) {
            self.seen.lock().push("started");
        }

        fn agent_stopped(&self, _agent: &AgentService) {
            std::thread::sleep(Duration::from_millis(50));
            self.seen.lock().push("stopped");
        }

        fn agent_failed(&self, _agent: &AgentService, _status: &FailureStatus) {
            self.seen.lock().push("failed");
        }
    }

    fn event_name(event: &LifecycleEvent) -> &'static str {
        match event {
            LifecycleEvent::Scheduled { .. } => "scheduled",
            LifecycleEvent::Started { .. } => "started",
            LifecycleEvent::Stopped { .. } => "stopped",
            LifecycleEvent::Failed { .. } => "failed",
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restart_events_arrive_in_transition_order() {
        let h = harness(sleeper());
        let recorder = Arc::new(Recorder::default());
        h.service.ctx.notifier.add_listener(recorder.clone());
        let mut events = h.service.ctx.notifier.subscribe();

        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);
        h.service.stop().await.unwrap();
        assert_eq!(*recorder.seen.lock(), vec!["scheduled", "started", "stopped"]);

        h.service.schedule().unwrap();
        assert_eq!(h.service.wait_until_settled().await, LifecyclePhase::Running);

        let expected = vec!["scheduled", "started", "stopped", "scheduled", "started"];
        assert_eq!(*recorder.seen.lock(), expected);
        let mut delivered = Vec::new();
        while let Ok(event) = events.try_recv() {
            delivered.push(event_name(&event));
        }
        assert_eq!(delivered, expected);

        h.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stdio_taken_once() {
        let h = harness(sleeper());
        assert!(h.service.take_stdio().is_none());

        h.service.schedule().unwrap();
        h.service.wait_until_settled().await;

        assert!(h.service.take_stdio().is_some());
        assert!(h.service.take_stdio().is_none());
        h.service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_version_first_line_or_sentinel() {
        let h = harness(
            AgentDescriptor::new("v", "Versioned", argv(&["agent"]))
                .with_version_command(argv(&["agent", "--version"])),
        );
        let version = &["agent", "--version"];

        h.runner.respond_lines(version, &["1.4.2", "built 2026-01-01"]);
        h.runner.respond(version, ProcessResult::new(1, vec!["oops".to_string()], vec![]));
        h.runner.respond_lines(version, &[]);
        h.runner.fail_launch(version);

        assert_eq!(h.service.version().await, "1.4.2");
        assert_eq!(h.service.version().await, VERSION_NOT_FOUND);
        assert_eq!(h.service.version().await, VERSION_NOT_FOUND);
        assert_eq!(h.service.version().await, VERSION_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dropping_service_stops_process() {
        let h = harness(sleeper());
        h.service.schedule().unwrap();
        h.service.wait_until_settled().await;
        let pid = h.service.snapshot().pid.unwrap();

        drop(h.service);

        eventually("the orphaned agent to exit", || !alive(pid)).await;
    }
}
