//! Lifecycle event fan-out

use super::AgentService;
use crate::types::{FailureStatus, LifecycleEvent};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Observer of agent lifecycle transitions.
///
/// Callbacks run on the task that performed the transition and must return
/// quickly. When `agent_started` runs, the process is already live.
pub trait AgentServiceListener: Send + Sync {
    fn agent_scheduled(&self, _agent: &AgentService) {}
    fn agent_started(&self, _agent: &AgentService) {}
    fn agent_stopped(&self, _agent: &AgentService) {}
    fn agent_failed(&self, _agent: &AgentService, _status: &FailureStatus) {}
}

/// Handle returned by [`LifecycleNotifier::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Delivers lifecycle transitions to listeners, in registration order, and
/// to broadcast subscribers.
pub struct LifecycleNotifier {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn AgentServiceListener>)>>,
    next_id: AtomicU64,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleNotifier {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn AgentServiceListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Returns `false` if the listener was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Stream of lifecycle events for async consumers
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, agent: &AgentService, event: LifecycleEvent) {
        // Listeners may register or unregister from inside a callback.
        let listeners: Vec<Arc<dyn AgentServiceListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in &listeners {
            match &event {
                LifecycleEvent::Scheduled { .. } => listener.agent_scheduled(agent),
                LifecycleEvent::Started { .. } => listener.agent_started(agent),
                LifecycleEvent::Stopped { .. } => listener.agent_stopped(agent),
                LifecycleEvent::Failed { status, .. } => listener.agent_failed(agent, status),
            }
        }

        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for LifecycleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LifecycleNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
