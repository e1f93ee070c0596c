//! Result events from workers to the coordinator
//!
//! Events are for observability and failure accounting only; crawl data
//! goes straight to the catalog. Per-worker order is FIFO, there is no
//! ordering across workers.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Worker lifecycle and per-entry problem reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEvent {
    Starting(usize),
    Working(usize),
    Idle(usize),
    NotFound(PathBuf),
    NoAccess(PathBuf),
    OsError(PathBuf, String),
    Error(usize, String),
    /// Stored metadata for a content hash differs from a fresh identification
    Mismatch(usize, PathBuf, String),
    Stopping(usize),
}

impl ResultEvent {
    /// Events that count towards the summary's error total
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ResultEvent::NotFound(_)
                | ResultEvent::NoAccess(_)
                | ResultEvent::OsError(..)
                | ResultEvent::Error(..)
        )
    }

    /// Worker lifecycle transitions
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ResultEvent::Starting(_)
                | ResultEvent::Working(_)
                | ResultEvent::Idle(_)
                | ResultEvent::Stopping(_)
        )
    }
}

impl fmt::Display for ResultEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultEvent::Starting(id) => write!(f, "worker {} starting", id),
            ResultEvent::Working(id) => write!(f, "worker {} working", id),
            ResultEvent::Idle(id) => write!(f, "worker {} idle", id),
            ResultEvent::NotFound(path) => write!(f, "not found: {}", path.display()),
            ResultEvent::NoAccess(path) => write!(f, "no access: {}", path.display()),
            ResultEvent::OsError(path, detail) => {
                write!(f, "os error on {}: {}", path.display(), detail)
            }
            ResultEvent::Error(id, detail) => write!(f, "worker {} error: {}", id, detail),
            ResultEvent::Mismatch(id, path, hash) => write!(
                f,
                "worker {} metadata mismatch for {} ({})",
                id,
                path.display(),
                hash
            ),
            ResultEvent::Stopping(id) => write!(f, "worker {} stopping", id),
        }
    }
}

/// Create the result channel
pub fn channel() -> (EventSender, EventReceiver) {
    let (sender, receiver) = unbounded();
    (EventSender { sender }, EventReceiver { receiver })
}

/// Worker side of the result channel
#[derive(Clone)]
pub struct EventSender {
    sender: Sender<ResultEvent>,
}

impl EventSender {
    /// Send an event; a gone coordinator is not the worker's problem
    pub fn send(&self, event: ResultEvent) {
        let _ = self.sender.send(event);
    }
}

/// Coordinator side of the result channel
pub struct EventReceiver {
    receiver: Receiver<ResultEvent>,
}

impl EventReceiver {
    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ResultEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take every event already queued
    pub fn drain(&self) -> Vec<ResultEvent> {
        self.receiver.try_iter().collect()
    }
}
