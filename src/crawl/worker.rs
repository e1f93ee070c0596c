//! Worker thread logic for the parallel crawl
//!
//! Each worker:
//! - Opens its own catalog session (one connection per thread)
//! - Pulls scan tasks from the work queue
//! - Expands directories into child tasks
//! - Runs the incremental identify-and-catalog decision on everything else
//! - Reports lifecycle changes and per-entry problems as events
//!
//! A task's failure (error or panic) never takes the worker down: it is
//! caught at the task boundary and reported as an `Error` event.

use crate::catalog::{Catalog, CatalogConnector, CatalogEntry, Metadata, MetadataStatus};
use crate::config::ScanConfig;
use crate::crawl::event::{EventSender, ResultEvent};
use crate::crawl::queue::{Popped, ScanTask, WorkQueueReceiver, WorkQueueSender};
use crate::error::{CrawlError, TaskOutcome, WorkerError};
use crate::identify::{EntryKind, Identifier};
use std::any::Any;
use std::fs;
use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace};

/// How long a worker waits on the queue before re-checking shutdown
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Tasks taken off the queue
    pub visited: AtomicU64,

    /// Directories enumerated
    pub dirs_expanded: AtomicU64,

    /// Files identified and written to the catalog
    pub files_cataloged: AtomicU64,

    /// Files skipped because size and mtime were already cataloged
    pub files_unchanged: AtomicU64,

    /// New metadata records written
    pub metadata_inserted: AtomicU64,

    /// Files whose content hash already had matching metadata
    pub dedup_hits: AtomicU64,

    /// Entries skipped (unknown kind, no content)
    pub skipped: AtomicU64,

    /// Bytes of content identified
    pub bytes_identified: AtomicU64,
}

impl WorkerStats {
    fn record_visit(&self) {
        self.visited.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Expanded { .. } => {
                self.dirs_expanded.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Unchanged { .. } => {
                self.files_unchanged.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Cataloged { new_metadata, .. } => {
                self.files_cataloged.fetch_add(1, Ordering::Relaxed);
                if *new_metadata {
                    self.metadata_inserted.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.dedup_hits.fetch_add(1, Ordering::Relaxed);
                }
            }
            TaskOutcome::Mismatch { .. } => {
                self.files_cataloged.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_bytes(&self, bytes: u64) {
        self.bytes_identified.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Everything a worker shares with the coordinator and its siblings
pub struct WorkerShared<C> {
    pub config: Arc<ScanConfig>,
    pub connector: Arc<C>,
    pub queue_rx: WorkQueueReceiver,
    pub queue_tx: WorkQueueSender,
    pub events: EventSender,
    pub shutdown: Arc<AtomicBool>,
}

impl<C> Clone for WorkerShared<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            queue_rx: self.queue_rx.clone(),
            queue_tx: self.queue_tx.clone(),
            events: self.events.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

/// A worker thread that processes scan tasks
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<Result<(), WorkerError>>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn<C, I>(id: usize, shared: WorkerShared<C>, identifier: I) -> Result<Self, WorkerError>
    where
        C: CatalogConnector,
        I: Identifier,
    {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("crawler-{}", id))
            .spawn(move || worker_loop(id, shared, identifier, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Whether the thread has exited (normally or not)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait for the worker to finish
    pub fn join(&mut self) -> Result<(), WorkerError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(result) => result,
                Err(payload) => Err(WorkerError::Panicked {
                    id: self.id,
                    message: panic_message(payload.as_ref()),
                }),
            }
        } else {
            Ok(())
        }
    }
}

/// What the worker last reported about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activity {
    Starting,
    Working,
    Idle,
}

/// Main worker loop
fn worker_loop<C, I>(
    id: usize,
    shared: WorkerShared<C>,
    mut identifier: I,
    stats: Arc<WorkerStats>,
) -> Result<(), WorkerError>
where
    C: CatalogConnector,
    I: Identifier,
{
    let events = &shared.events;
    events.send(ResultEvent::Starting(id));
    debug!(worker = id, "Worker starting");

    let mut catalog = match shared.connector.connect() {
        Ok(catalog) => catalog,
        Err(e) => {
            error!(worker = id, error = %e, "Failed to open catalog session");
            events.send(ResultEvent::Error(id, format!("catalog unavailable: {}", e)));
            events.send(ResultEvent::Stopping(id));
            return Err(WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            });
        }
    };

    let mut activity = Activity::Starting;

    while !shared.shutdown.load(Ordering::Relaxed) {
        let (task, guard) = match shared.queue_rx.pop(POLL_INTERVAL) {
            Popped::Task(task, guard) => (task, guard),
            Popped::Quit => break,
            Popped::Empty => {
                if activity != Activity::Idle {
                    events.send(ResultEvent::Idle(id));
                    activity = Activity::Idle;
                }
                continue;
            }
        };

        if activity != Activity::Working {
            events.send(ResultEvent::Working(id));
            activity = Activity::Working;
        }
        stats.record_visit();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            process_task(id, &task, &shared, &mut catalog, &mut identifier, &stats)
        }));

        match result {
            Ok(Ok(Some(outcome))) => {
                stats.record_outcome(&outcome);
                match &outcome {
                    TaskOutcome::Mismatch { path, content_hash } => {
                        events.send(ResultEvent::Mismatch(
                            id,
                            path.into(),
                            content_hash.clone(),
                        ));
                    }
                    TaskOutcome::Skipped { path, reason } => {
                        debug!(worker = id, path = %path, reason = %reason, "Entry skipped");
                    }
                    other => {
                        trace!(worker = id, path = %other.path(), outcome = ?other, "Task done");
                    }
                }
            }
            // Already reported as an event
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                events.send(ResultEvent::Error(
                    id,
                    format!("{}: {}", task.full_path().display(), e),
                ));
            }
            Err(payload) => {
                events.send(ResultEvent::Error(
                    id,
                    format!(
                        "{}: panicked: {}",
                        task.full_path().display(),
                        panic_message(payload.as_ref())
                    ),
                ));
            }
        }

        // Released only after every event for this task is sent
        drop(guard);
    }

    info!(
        worker = id,
        visited = stats.visited.load(Ordering::Relaxed),
        cataloged = stats.files_cataloged.load(Ordering::Relaxed),
        "Worker shutting down"
    );
    events.send(ResultEvent::Stopping(id));

    Ok(())
}

/// Handle one task. `Ok(None)` means the entry was reported as an event
/// (missing, no access, stat failure) and there is nothing more to record.
fn process_task<S, I>(
    worker_id: usize,
    task: &ScanTask,
    shared: &WorkerShared<impl CatalogConnector>,
    catalog: &mut S,
    identifier: &mut I,
    stats: &WorkerStats,
) -> Result<Option<TaskOutcome>, CrawlError>
where
    S: Catalog,
    I: Identifier,
{
    let path = task.full_path();

    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            shared.events.send(ResultEvent::NotFound(path));
            return Ok(None);
        }
        Err(e) => {
            shared.events.send(ResultEvent::OsError(path, e.to_string()));
            return Ok(None);
        }
    };

    if meta.is_dir() {
        return Ok(expand_directory(worker_id, task, &path, shared));
    }

    let outcome = catalog_file(&path, &meta, &task.source, catalog, identifier)?;
    if outcome.wrote_catalog() || matches!(outcome, TaskOutcome::Mismatch { .. }) {
        stats.record_bytes(meta.len());
    }
    Ok(Some(outcome))
}

/// Push one task per child of `dir`
fn expand_directory(
    worker_id: usize,
    task: &ScanTask,
    dir: &Path,
    shared: &WorkerShared<impl CatalogConnector>,
) -> Option<TaskOutcome> {
    if !can_enter(dir) {
        shared.events.send(ResultEvent::NoAccess(dir.to_path_buf()));
        return None;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            shared.events.send(ResultEvent::NoAccess(dir.to_path_buf()));
            return None;
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            shared.events.send(ResultEvent::NotFound(dir.to_path_buf()));
            return None;
        }
        Err(e) => {
            shared.events.send(ResultEvent::OsError(dir.to_path_buf(), e.to_string()));
            return None;
        }
    };

    let mut children = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                shared.events.send(ResultEvent::OsError(dir.to_path_buf(), e.to_string()));
                continue;
            }
        };

        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }

        let child_path = dir.join(&name);
        if shared.config.is_excluded(&child_path.to_string_lossy()) {
            trace!(worker = worker_id, path = %child_path.display(), "Excluded");
            continue;
        }

        shared
            .queue_tx
            .push(ScanTask::child(dir, name, &task.source));
        children += 1;
    }

    Some(TaskOutcome::Expanded {
        path: dir.to_string_lossy().into_owned(),
        children,
    })
}

/// The incremental identify-and-catalog decision for one non-directory
pub fn catalog_file<S, I>(
    path: &Path,
    meta: &fs::Metadata,
    source: &str,
    catalog: &mut S,
    identifier: &mut I,
) -> Result<TaskOutcome, CrawlError>
where
    S: Catalog,
    I: Identifier,
{
    let path_str = path.to_string_lossy().into_owned();
    let size = meta.len();
    let mtime = mtime_ns(meta);

    if catalog
        .lookup_entries(&path_str, source)?
        .iter()
        .any(|stored| stored.matches(size, mtime))
    {
        return Ok(TaskOutcome::Unchanged { path: path_str });
    }

    let identification = identifier.identify(path)?;
    if identification.kind == EntryKind::Unknown {
        return Ok(TaskOutcome::Skipped {
            path: path_str,
            reason: "unknown entry kind".into(),
        });
    }
    let Some(content_hash) = identification.content_hash else {
        return Ok(TaskOutcome::Skipped {
            path: path_str,
            reason: format!("no content hash for {}", identification.kind),
        });
    };

    let entry = CatalogEntry {
        path: path_str.clone(),
        source: source.to_string(),
        size,
        mtime_ns: mtime,
        content_hash: content_hash.clone(),
    };

    match catalog.record_file(&entry, &identification.metadata)? {
        MetadataStatus::Inserted => Ok(TaskOutcome::Cataloged {
            path: path_str,
            content_hash,
            new_metadata: true,
        }),
        MetadataStatus::Existing(stored) if same_metadata(&stored, &identification.metadata) => {
            Ok(TaskOutcome::Cataloged {
                path: path_str,
                content_hash,
                new_metadata: false,
            })
        }
        MetadataStatus::Existing(_) => Ok(TaskOutcome::Mismatch {
            path: path_str,
            content_hash,
        }),
    }
}

fn same_metadata(stored: &Metadata, fresh: &Metadata) -> bool {
    stored == fresh
}

/// Modification time in nanoseconds since the Unix epoch
pub fn mtime_ns(meta: &fs::Metadata) -> i64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        meta.mtime()
            .saturating_mul(1_000_000_000)
            .saturating_add(meta.mtime_nsec())
    }

    #[cfg(not(unix))]
    {
        meta.modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }
}

/// Whether the current user may list and enter `dir`
#[cfg(unix)]
fn can_enter(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    match CString::new(dir.as_os_str().as_bytes()) {
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::X_OK) == 0 },
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn can_enter(_dir: &Path) -> bool {
    true
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aggregate statistics from multiple workers
pub fn aggregate_stats(workers: &[Worker]) -> WorkerTotals {
    let mut totals = WorkerTotals::default();
    for worker in workers {
        let s = &worker.stats;
        totals.visited += s.visited.load(Ordering::Relaxed);
        totals.dirs_expanded += s.dirs_expanded.load(Ordering::Relaxed);
        totals.files_cataloged += s.files_cataloged.load(Ordering::Relaxed);
        totals.files_unchanged += s.files_unchanged.load(Ordering::Relaxed);
        totals.metadata_inserted += s.metadata_inserted.load(Ordering::Relaxed);
        totals.dedup_hits += s.dedup_hits.load(Ordering::Relaxed);
        totals.skipped += s.skipped.load(Ordering::Relaxed);
        totals.bytes_identified += s.bytes_identified.load(Ordering::Relaxed);
    }
    totals
}

/// Sum of every worker's counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerTotals {
    pub visited: u64,
    pub dirs_expanded: u64,
    pub files_cataloged: u64,
    pub files_unchanged: u64,
    pub metadata_inserted: u64,
    pub dedup_hits: u64,
    pub skipped: u64,
    pub bytes_identified: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::crawl::event;
    use crate::crawl::queue::WorkQueue;
    use crate::error::IdentifyResult;
    use crate::identify::{FileIdentifier, Identification};
    use serde_json::json;
    use tempfile::tempdir;

    /// Identifier returning fixed metadata and counting calls
    struct CountingIdentifier {
        inner: FileIdentifier,
        calls: usize,
    }

    impl Identifier for CountingIdentifier {
        fn identify(&mut self, path: &Path) -> IdentifyResult<Identification> {
            self.calls += 1;
            self.inner.identify(path)
        }
    }

    fn identifier() -> CountingIdentifier {
        CountingIdentifier {
            inner: FileIdentifier::new().without_external_tools(),
            calls: 0,
        }
    }

    #[test]
    fn test_worker_stats() {
        let stats = WorkerStats::default();
        stats.record_visit();
        stats.record_outcome(&TaskOutcome::Cataloged {
            path: "/a".into(),
            content_hash: "h".into(),
            new_metadata: true,
        });
        stats.record_outcome(&TaskOutcome::Cataloged {
            path: "/b".into(),
            content_hash: "h".into(),
            new_metadata: false,
        });
        stats.record_outcome(&TaskOutcome::Unchanged { path: "/a".into() });

        assert_eq!(stats.visited.load(Ordering::Relaxed), 1);
        assert_eq!(stats.files_cataloged.load(Ordering::Relaxed), 2);
        assert_eq!(stats.metadata_inserted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.dedup_hits.load(Ordering::Relaxed), 1);
        assert_eq!(stats.files_unchanged.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_catalog_file_then_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"same").unwrap();
        let meta = std::fs::metadata(&path).unwrap();

        let mut catalog = MemoryCatalog::new();
        let mut id = identifier();

        let first = catalog_file(&path, &meta, "src", &mut catalog, &mut id).unwrap();
        assert!(matches!(first, TaskOutcome::Cataloged { new_metadata: true, .. }));

        let second = catalog_file(&path, &meta, "src", &mut catalog, &mut id).unwrap();
        assert!(matches!(second, TaskOutcome::Unchanged { .. }));
        assert_eq!(id.calls, 1);

        // A different source label has no history for this path
        let other = catalog_file(&path, &meta, "other", &mut catalog, &mut id).unwrap();
        assert!(matches!(other, TaskOutcome::Cataloged { new_metadata: false, .. }));
        assert_eq!(catalog.entry_count(), 2);
        assert_eq!(catalog.metadata_count(), 1);
    }

    #[test]
    fn test_catalog_file_reports_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"content").unwrap();
        let meta = std::fs::metadata(&path).unwrap();

        let mut catalog = MemoryCatalog::new();
        let hash = crate::identify::checksum::hash_bytes(b"content");
        let mut planted = Metadata::new();
        planted.insert("format".into(), json!("SOMETHING ELSE"));
        catalog.seed_metadata(&hash, planted.clone());

        let outcome = catalog_file(&path, &meta, "src", &mut catalog, &mut identifier()).unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Mismatch {
                path: path.to_string_lossy().into_owned(),
                content_hash: hash.clone(),
            }
        );
        // Entry recorded, metadata untouched
        assert_eq!(catalog.entry_count(), 1);
        assert_eq!(catalog.lookup_metadata(&hash).unwrap(), Some(planted));
    }

    fn shared(queue: &WorkQueue, events: EventSender) -> WorkerShared<MemoryCatalog> {
        WorkerShared {
            config: Arc::new(ScanConfig::new(Vec::new())),
            connector: Arc::new(MemoryCatalog::new()),
            queue_rx: queue.receiver(),
            queue_tx: queue.sender(),
            events,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn next_event(rx: &event::EventReceiver) -> ResultEvent {
        rx.recv_timeout(Duration::from_secs(5)).expect("no event from worker")
    }

    #[test]
    fn test_worker_without_tasks_reports_idle_once() {
        let queue = WorkQueue::new();
        let (tx, rx) = event::channel();
        let shared = shared(&queue, tx);
        let shutdown = Arc::clone(&shared.shutdown);

        let mut worker = Worker::spawn(7, shared, identifier()).unwrap();

        assert_eq!(next_event(&rx), ResultEvent::Starting(7));
        assert_eq!(next_event(&rx), ResultEvent::Idle(7));
        // Further timeouts stay quiet
        assert_eq!(rx.recv_timeout(POLL_INTERVAL * 3), None);

        shutdown.store(true, Ordering::Relaxed);
        worker.join().unwrap();
        assert_eq!(rx.drain(), vec![ResultEvent::Stopping(7)]);
    }

    #[test]
    fn test_worker_goes_working_then_idle() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let queue = WorkQueue::new();
        let (tx, rx) = event::channel();
        let shared = shared(&queue, tx);
        let shutdown = Arc::clone(&shared.shutdown);
        let catalog = (*shared.connector).clone();
        queue.seed(ScanTask::root(dir.path().join("a.txt"), "src"));

        let mut worker = Worker::spawn(1, shared, identifier()).unwrap();

        assert_eq!(next_event(&rx), ResultEvent::Starting(1));
        assert_eq!(next_event(&rx), ResultEvent::Working(1));
        assert_eq!(next_event(&rx), ResultEvent::Idle(1));
        assert!(queue.is_quiescent());

        shutdown.store(true, Ordering::Relaxed);
        worker.join().unwrap();
        assert_eq!(catalog.entry_count(), 1);
        assert_eq!(worker.stats().files_cataloged.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_mtime_ns_tracks_set_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000, 500)).unwrap();
        assert_eq!(mtime_ns(&std::fs::metadata(&path).unwrap()), 1_000_000_000_500);
    }
}
