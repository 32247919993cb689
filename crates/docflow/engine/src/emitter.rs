//! Broadcast fan-out of workflow events.

use tokio::sync::broadcast;
use tracing::trace;

use docflow_types::WorkflowEvent;

/// Default capacity of the event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Publishes [`WorkflowEvent`]s to any number of subscribers.
///
/// Backed by a bounded `tokio::sync::broadcast` channel: slow subscribers
/// observe a lag error rather than blocking the engine, and dropping a
/// receiver unsubscribes it. Emitting with no subscribers is a no-op.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// New subscription; receives events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: WorkflowEvent) {
        trace!(
            instance = %event.instance_id,
            kind = %event.kind,
            "Workflow event emitted"
        );
        // Err only means nobody is listening right now
        let _ = self.sender.send(event);
    }

    pub fn emit_all(&self, events: Vec<WorkflowEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_types::{WorkflowEventKind, WorkflowInstanceId};
    use std::time::Duration;
    use tokio::time::timeout;

    fn started_event() -> WorkflowEvent {
        WorkflowEvent::workflow(
            WorkflowInstanceId::generate(),
            WorkflowEventKind::WorkflowStarted,
        )
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        emitter.emit(started_event());

        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, WorkflowEventKind::WorkflowStarted);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_noop() {
        let emitter = EventEmitter::default();
        emitter.emit(started_event());
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_count_tracks_drops() {
        let emitter = EventEmitter::default();
        let rx1 = emitter.subscribe();
        let rx2 = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 2);
        drop(rx1);
        drop(rx2);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let emitter = EventEmitter::default();
        emitter.emit(started_event());

        let mut rx = emitter.subscribe();
        emitter.emit(WorkflowEvent::workflow(
            WorkflowInstanceId::generate(),
            WorkflowEventKind::WorkflowCompleted,
        ));

        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, WorkflowEventKind::WorkflowCompleted);
        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }
}
