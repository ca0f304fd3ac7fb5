//! Process-local event bus.
//!
//! A single bounded broadcast channel; subscribers that fall behind lose
//! the oldest events rather than blocking the publisher. Adequate for UI
//! push and logging, no broker involved.

use tokio::sync::broadcast;

/// Bounded capacity per subscriber channel; overflow drops oldest.
pub const EVENT_CHANNEL_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshEvent {
    RefreshStarted,
    RefreshCompleted {
        succeeded: bool,
        error_summary: Option<String>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RefreshEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. Publishing with no subscribers
    /// is not an error.
    pub fn publish(&self, event: RefreshEvent) {
        let _ = self.tx.send(event);
    }
}
