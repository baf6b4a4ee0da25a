//! Background Task Queue (C4): a bounded FIFO decoupling request submission
//! from execution, with worker fan-out. Grounded in the toolkit's
//! `mcp_http_adapter.rs` (spawning a worker via `tokio::spawn` that runs
//! independently of the request that triggered it) and `http_client_pool.rs`
//! (a shared, pooled resource guarded for concurrent access) for the
//! overall "shared, bounded, pluggable resource" shape.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::message::Message;

#[derive(Debug, Clone)]
pub enum QueueError {
    Full,
    Closed,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => write!(f, "task queue is full"),
            QueueError::Closed => write!(f, "task queue is closed"),
        }
    }
}

impl std::error::Error for QueueError {}

/// One piece of work: the task to drive, the context it belongs to, the
/// message that triggered this run, and a cancellation handle owned by the
/// enqueuer (§3 — "Queue entry").
pub struct QueueEntry {
    pub task_id: String,
    pub context_id: String,
    pub message: Message,
    pub cancel: CancellationToken,
}

/// The provider contract (§4.5): an in-memory implementation and,
/// optionally, an external provider keyed by connection config, share this
/// trait. The core never assumes which is in use.
#[async_trait]
pub trait QueueProvider: Send + Sync {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError>;
}

/// A bounded, in-process FIFO backed by `tokio::sync::mpsc`. `enqueue`
/// fails immediately with `QueueError::Full` at capacity rather than
/// awaiting space, per §4.5's "fails with queue-full when at capacity".
pub struct InMemoryQueue {
    sender: mpsc::Sender<QueueEntry>,
}

pub struct QueueHandle {
    pub receiver: mpsc::Receiver<QueueEntry>,
}

impl InMemoryQueue {
    /// Builds a queue of the given capacity along with the receiving half
    /// workers drain from.
    pub fn new(capacity: usize) -> (Self, QueueHandle) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, QueueHandle { receiver })
    }

    /// Entries currently sitting in the channel, waiting for a worker —
    /// derived straight from the channel's own capacity accounting rather
    /// than a separately maintained counter, so it can never drift.
    pub fn depth(&self) -> u64 {
        (self.sender.max_capacity() - self.sender.capacity()) as u64
    }
}

#[async_trait]
impl QueueProvider for InMemoryQueue {
    async fn enqueue(&self, entry: QueueEntry) -> Result<(), QueueError> {
        self.sender.try_send(entry).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(task_id: &str) -> QueueEntry {
        QueueEntry {
            task_id: task_id.to_string(),
            context_id: "ctx-1".to_string(),
            message: Message::user_text("hi"),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn enqueue_succeeds_under_capacity() {
        let (queue, mut handle) = InMemoryQueue::new(2);
        queue.enqueue(entry("t1")).await.unwrap();
        let received = handle.receiver.recv().await.unwrap();
        assert_eq!(received.task_id, "t1");
    }

    #[tokio::test]
    async fn enqueue_fails_when_full() {
        let (queue, _handle) = InMemoryQueue::new(1);
        queue.enqueue(entry("t1")).await.unwrap();
        let err = queue.enqueue(entry("t2")).await;
        assert!(matches!(err, Err(QueueError::Full)));
    }

    #[tokio::test]
    async fn depth_tracks_entries_awaiting_a_worker() {
        let (queue, mut handle) = InMemoryQueue::new(2);
        assert_eq!(queue.depth(), 0);
        queue.enqueue(entry("t1")).await.unwrap();
        queue.enqueue(entry("t2")).await.unwrap();
        assert_eq!(queue.depth(), 2);
        let _ = handle.receiver.recv().await.unwrap();
        assert_eq!(queue.depth(), 1);
    }
}
