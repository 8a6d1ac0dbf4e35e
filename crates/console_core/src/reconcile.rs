use shared::domain::CompetitionId;
use tokio::sync::broadcast;

use crate::jobs::JobClass;

/// The part of the console that must be re-derived after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenderScope {
    Dashboard,
    Containers(CompetitionId),
    Teams(CompetitionId),
    Job(JobClass),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Render(RenderScope),
    /// Advisory text for the operator (action results, failures).
    Notice(String),
}

/// Supplied by the presentation layer. Called synchronously on the
/// completion path of every state mutation, after all fields are written.
pub trait Reconciler: Send + Sync {
    fn reconcile(&self, scope: RenderScope);

    fn notice(&self, _message: &str) {}
}

pub struct NoopReconciler;

impl Reconciler for NoopReconciler {
    fn reconcile(&self, _scope: RenderScope) {}
}

/// Publishes reconciliation requests on a broadcast channel so any number
/// of front ends can follow along.
pub struct EventReconciler {
    events: broadcast::Sender<ConsoleEvent>,
}

impl EventReconciler {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }
}

impl Default for EventReconciler {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Reconciler for EventReconciler {
    fn reconcile(&self, scope: RenderScope) {
        let _ = self.events.send(ConsoleEvent::Render(scope));
    }

    fn notice(&self, message: &str) {
        let _ = self.events.send(ConsoleEvent::Notice(message.to_string()));
    }
}
