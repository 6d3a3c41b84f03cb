//! Live streaming channel scoped to one submission
//!
//! A channel is a pair of queues to a background task owning the transport:
//! decoded [`LiveEvent`]s flow in, [`ChannelCommand`]s flow out. Dropping the
//! channel aborts the task.

pub mod backoff;
pub mod codec;
mod socketio;

pub use backoff::Backoff;
pub use socketio::SocketIoConnector;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Errors raised by the live channel
#[derive(Error, Debug)]
pub enum LiveError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    Closed,
}

/// Messages the server pushes for a watched submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Something is about to produce results
    Start(String),
    /// Processing stopped, possibly only for one file
    Stop(String),
    /// A new result key; `None` resets the result buffer
    CacheKey(Option<String>),
    /// A new error key; `None` resets the error buffer
    CacheKeyErr(Option<String>),
    /// The watch queue is unusable and must be registered again
    Error(String),
}

/// Commands sent to the transport task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Subscribe to a watch queue, replaying from its creation
    Listen { wq_id: String },
    Close,
}

const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Handle on an open streaming channel
pub struct LiveChannel {
    events: mpsc::Receiver<LiveEvent>,
    commands: mpsc::Sender<ChannelCommand>,
    task: Option<JoinHandle<()>>,
}

impl LiveChannel {
    pub fn new(
        events: mpsc::Receiver<LiveEvent>,
        commands: mpsc::Sender<ChannelCommand>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { events, commands, task }
    }

    /// Next decoded event, `None` once the transport is gone
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    /// Ask the server to deliver messages of a watch queue
    pub async fn listen(&self, wq_id: &str) -> Result<(), LiveError> {
        self.commands
            .send(ChannelCommand::Listen { wq_id: wq_id.to_string() })
            .await
            .map_err(|_| LiveError::Closed)
    }

    /// Disconnect, giving the transport a moment to say goodbye
    pub async fn close(mut self) {
        let _ = self.commands.send(ChannelCommand::Close).await;
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens streaming channels
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, sid: &str) -> Result<LiveChannel, LiveError>;
}
