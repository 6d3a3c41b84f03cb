//! Typed notifications published by the watch controller

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{LiveStatus, OutstandingServices};

/// Something observable happened while watching a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    StatusChanged { from: LiveStatus, to: LiveStatus },
    /// A batched fetch was folded in
    ResultsMerged { results: usize, errors: usize },
    OutstandingServices { services: OutstandingServices },
    ChannelError { message: String },
    Completed { sid: String },
}

/// Sending half of the event bus; publishing without subscribers is not an error
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WatchEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: WatchEvent) {
        let _ = self.sender.send(event);
    }
}
