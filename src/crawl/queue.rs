//! Work queue for scan tasks
//!
//! An unbounded MPMC FIFO holding the breadth-first frontier of the crawl.
//! Alongside the channel it keeps a pending-work counter: the exact number
//! of tasks pushed but not yet completed. Pushing increments the counter
//! before the task becomes visible, and a popped task carries a
//! [`TaskGuard`] that decrements it when dropped. Since children are pushed
//! while their parent's guard is still alive, the counter reaches zero only
//! when the frontier is empty and nothing is in flight.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A path to visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTask {
    /// Parent directory; `None` means `name` is already absolute
    pub base: Option<PathBuf>,

    /// Entry name within `base`, or the full path of a root
    pub name: PathBuf,

    /// Source label inherited from the root this task descends from
    pub source: Arc<str>,
}

impl ScanTask {
    /// Task for a crawl root
    pub fn root(path: impl Into<PathBuf>, source: impl Into<Arc<str>>) -> Self {
        Self {
            base: None,
            name: path.into(),
            source: source.into(),
        }
    }

    /// Task for a directory child, sharing the parent's source label
    pub fn child(base: &Path, name: impl Into<PathBuf>, source: &Arc<str>) -> Self {
        Self {
            base: Some(base.to_path_buf()),
            name: name.into(),
            source: Arc::clone(source),
        }
    }

    /// `base/name`, or `name` for roots
    pub fn full_path(&self) -> PathBuf {
        match &self.base {
            Some(base) => base.join(&self.name),
            None => self.name.clone(),
        }
    }
}

/// Message carried by the queue
#[derive(Debug)]
pub enum WorkItem {
    Scan(ScanTask),
    /// Tells exactly one worker to exit
    Quit,
}

/// Result of [`WorkQueueReceiver::pop`]
#[derive(Debug)]
pub enum Popped {
    /// A task; the guard releases its pending-work unit when dropped
    Task(ScanTask, TaskGuard),
    Quit,
    /// Nothing arrived within the timeout
    Empty,
}

/// Statistics for the work queue
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Total tasks enqueued
    pub enqueued: AtomicU64,

    /// Total tasks dequeued
    pub dequeued: AtomicU64,

    /// Total tasks whose guard has been released
    pub completed: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Unbounded work queue with pending-work accounting
pub struct WorkQueue {
    sender: Sender<WorkItem>,
    receiver: Receiver<WorkItem>,
    pending: Arc<AtomicU64>,
    stats: Arc<QueueStats>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            pending: Arc::new(AtomicU64::new(0)),
            stats: Arc::new(QueueStats::default()),
        }
    }

    /// Get a sender for this queue (clone for each worker)
    pub fn sender(&self) -> WorkQueueSender {
        WorkQueueSender {
            sender: self.sender.clone(),
            pending: Arc::clone(&self.pending),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Get a receiver for this queue (clone for each worker)
    pub fn receiver(&self) -> WorkQueueReceiver {
        WorkQueueReceiver {
            receiver: self.receiver.clone(),
            pending: Arc::clone(&self.pending),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Seed a root task
    pub fn seed(&self, task: ScanTask) {
        self.sender().push(task);
    }

    /// Push one quit message
    pub fn quit(&self) {
        // The queue keeps a receiver alive, so this cannot disconnect
        let _ = self.sender.send(WorkItem::Quit);
    }

    /// Tasks pushed but not yet completed
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// True when no task is queued or in flight
    pub fn is_quiescent(&self) -> bool {
        self.pending() == 0
    }

    /// Messages currently sitting in the channel (tasks and quits)
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for pushing tasks
#[derive(Clone)]
pub struct WorkQueueSender {
    sender: Sender<WorkItem>,
    pending: Arc<AtomicU64>,
    stats: Arc<QueueStats>,
}

impl WorkQueueSender {
    /// Push a task. The pending counter is incremented before the task is
    /// visible to any consumer.
    pub fn push(&self, task: ScanTask) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(WorkItem::Scan(task)).is_err() {
            // Every receiver is gone; nobody will ever complete it
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle for popping tasks
#[derive(Clone)]
pub struct WorkQueueReceiver {
    receiver: Receiver<WorkItem>,
    pending: Arc<AtomicU64>,
    stats: Arc<QueueStats>,
}

impl WorkQueueReceiver {
    /// Wait up to `timeout` for the next message
    pub fn pop(&self, timeout: Duration) -> Popped {
        match self.receiver.recv_timeout(timeout) {
            Ok(WorkItem::Scan(task)) => {
                self.stats.dequeued.fetch_add(1, Ordering::Relaxed);
                let guard = TaskGuard {
                    pending: Arc::clone(&self.pending),
                    stats: Arc::clone(&self.stats),
                };
                Popped::Task(task, guard)
            }
            Ok(WorkItem::Quit) => Popped::Quit,
            Err(RecvTimeoutError::Timeout) => Popped::Empty,
            Err(RecvTimeoutError::Disconnected) => Popped::Quit,
        }
    }

    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }
}

/// RAII guard for one in-flight task; releases its pending-work unit on
/// drop, including while unwinding.
#[derive(Debug)]
pub struct TaskGuard {
    pending: Arc<AtomicU64>,
    stats: Arc<QueueStats>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(10);

    #[test]
    fn test_queue_basic() {
        let queue = WorkQueue::new();
        queue.seed(ScanTask::root("/test", "test"));
        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.len(), 1);

        let receiver = queue.receiver();
        match receiver.pop(WAIT) {
            Popped::Task(task, guard) => {
                assert_eq!(task.full_path(), PathBuf::from("/test"));
                assert_eq!(&*task.source, "test");
                assert_eq!(queue.pending(), 1);
                drop(guard);
            }
            other => panic!("expected task, got {:?}", other),
        }
        assert!(queue.is_quiescent());
    }

    #[test]
    fn test_child_pushed_before_parent_completes() {
        let queue = WorkQueue::new();
        let sender = queue.sender();
        let receiver = queue.receiver();
        queue.seed(ScanTask::root("/data", "data"));

        let Popped::Task(parent, guard) = receiver.pop(WAIT) else {
            panic!("expected task");
        };
        sender.push(ScanTask::child(&parent.full_path(), "sub", &parent.source));
        drop(guard);

        // Parent done, child still queued
        assert_eq!(queue.pending(), 1);

        let Popped::Task(child, guard) = receiver.pop(WAIT) else {
            panic!("expected child task");
        };
        assert_eq!(child.full_path(), PathBuf::from("/data/sub"));
        assert_eq!(&*child.source, "data");
        drop(guard);
        assert!(queue.is_quiescent());
    }

    #[test]
    fn test_pop_empty_and_quit() {
        let queue = WorkQueue::new();
        let receiver = queue.receiver();
        assert!(matches!(receiver.pop(WAIT), Popped::Empty));

        queue.quit();
        assert!(matches!(receiver.pop(WAIT), Popped::Quit));
        // Quit messages are not work
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_guard_released_on_unwind() {
        let queue = WorkQueue::new();
        let receiver = queue.receiver();
        queue.seed(ScanTask::root("/x", "x"));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _popped = receiver.pop(WAIT);
            panic!("task failed");
        }));
        assert!(result.is_err());
        assert!(queue.is_quiescent());
    }

    #[test]
    fn test_queue_stats() {
        let queue = WorkQueue::new();
        let sender = queue.sender();
        let receiver = queue.receiver();

        sender.push(ScanTask::root("/a", "a"));
        sender.push(ScanTask::root("/b", "b"));
        drop(receiver.pop(WAIT));
        let _held = receiver.pop(WAIT);

        let stats = queue.stats();
        assert_eq!(stats.enqueued(), 2);
        assert_eq!(stats.dequeued(), 2);
        assert_eq!(stats.completed(), 1);
        assert_eq!(queue.pending(), 1);
    }
}
