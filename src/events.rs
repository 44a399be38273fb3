//! UI-facing events emitted when an action is blocked by missing resources

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UiEvent {
    NoLives,
    NoHints,
    NoCoins,
}

impl fmt::Display for UiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UiEvent::NoLives => "no lives left",
            UiEvent::NoHints => "no hints left",
            UiEvent::NoCoins => "not enough coins",
        };
        f.write_str(text)
    }
}

/// Fan-out sink for [`UiEvent`]s; cheap to clone
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<UiEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Emit an event to every current subscriber
    pub fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            debug!(%event, "no subscribers for ui event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}
