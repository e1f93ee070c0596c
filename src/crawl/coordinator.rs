//! Scan coordinator - orchestrates the parallel crawl
//!
//! The coordinator is responsible for:
//! - Setting up the work queue, result channel and workers
//! - Seeding one task per root
//! - Observing worker events and counting problems
//! - Detecting quiescence and stopping the workers
//! - Final statistics
//!
//! Termination is decided by the queue's pending-work counter, never by
//! sampling queue length and worker flags. Once it reads zero every task
//! ever pushed has completed, so one quit message per worker is enough to
//! shut the pool down.

use crate::catalog::CatalogConnector;
use crate::config::ScanConfig;
use crate::crawl::event::{self, EventReceiver, ResultEvent};
use crate::crawl::queue::{ScanTask, WorkQueue};
use crate::crawl::worker::{aggregate_stats, Worker, WorkerShared, WorkerTotals};
use crate::error::{Result, WorkerError};
use crate::identify::Identifier;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long the coordinator waits for an event before re-checking state
const EVENT_POLL: Duration = Duration::from_millis(100);

/// Minimum time between progress callbacks
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Result of a finished scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Tasks processed (every path visited)
    pub visited: u64,

    /// Directories enumerated
    pub dirs_expanded: u64,

    /// Files identified and written to the catalog
    pub files_cataloged: u64,

    /// Files skipped because they were already cataloged
    pub files_unchanged: u64,

    /// New metadata records
    pub metadata_inserted: u64,

    /// Files whose content already had matching metadata
    pub dedup_hits: u64,

    /// Entries not cataloged (sockets, fifos, devices)
    pub skipped: u64,

    /// Metadata mismatches reported
    pub mismatches: u64,

    /// Error events (not found, no access, OS errors, task failures)
    pub errors: u64,

    /// Worker threads that died
    pub worker_failures: u64,

    /// Bytes of content identified
    pub bytes_identified: u64,

    /// Time taken for the scan
    pub duration: Duration,

    /// Whether the scan completed (vs was interrupted)
    pub completed: bool,
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    pub totals: WorkerTotals,
    pub errors: u64,
    pub mismatches: u64,

    /// Tasks queued or in flight
    pub pending: u64,

    pub active_workers: usize,
    pub total_workers: usize,
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Paths visited per second
    pub fn entries_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.totals.visited as f64 / secs
        } else {
            0.0
        }
    }
}

/// Event tallies kept by the coordinator
#[derive(Debug, Default)]
struct EventCounts {
    errors: u64,
    mismatches: u64,
    /// Per-worker working flag, from Working/Idle/Stopping events
    working: Vec<bool>,
}

impl EventCounts {
    fn new(workers: usize) -> Self {
        Self {
            working: vec![false; workers],
            ..Default::default()
        }
    }

    fn active(&self) -> usize {
        self.working.iter().filter(|w| **w).count()
    }

    fn set_working(&mut self, id: usize, working: bool) {
        if let Some(flag) = self.working.get_mut(id) {
            *flag = working;
        }
    }
}

/// Coordinates the parallel crawl
pub struct ScanCoordinator<C, I> {
    /// Configuration
    config: Arc<ScanConfig>,

    /// Opens one catalog session per worker
    connector: Arc<C>,

    /// Prototype identifier, cloned into each worker
    identifier: I,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl<C, I> ScanCoordinator<C, I>
where
    C: CatalogConnector,
    I: Identifier + Clone,
{
    /// Create a new scan coordinator
    pub fn new(config: ScanConfig, connector: C, identifier: I) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
            identifier,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the scan
    pub fn run(self) -> Result<ScanSummary> {
        self.run_with_progress(|_| {})
    }

    /// Run the scan, calling `on_progress` periodically from this thread
    pub fn run_with_progress<F>(self, mut on_progress: F) -> Result<ScanSummary>
    where
        F: FnMut(&ScanProgress),
    {
        let start_time = Instant::now();
        let worker_count = self.config.worker_count;

        info!(
            roots = self.config.roots.len(),
            workers = worker_count,
            "Starting scan"
        );

        let queue = WorkQueue::new();
        let (events_tx, events_rx) = event::channel();

        self.seed_roots(&queue)?;

        let shared = WorkerShared {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
            queue_rx: queue.receiver(),
            queue_tx: queue.sender(),
            events: events_tx,
            shutdown: Arc::clone(&self.shutdown),
        };

        let mut workers = Vec::with_capacity(worker_count);
        let mut worker_failures = 0u64;
        for id in 0..worker_count {
            match Worker::spawn(id, shared.clone(), self.identifier.clone()) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    warn!(error = %e, "Failed to spawn worker");
                    worker_failures += 1;
                }
            }
        }
        // Workers hold the only senders from here on
        drop(shared);
        debug!(count = workers.len(), "Workers spawned");

        let mut counts = EventCounts::new(worker_count);
        let mut last_progress = Instant::now();

        let completed = loop {
            if let Some(event) = events_rx.recv_timeout(EVENT_POLL) {
                self.observe(&event, &mut counts);
            }
            self.drain(&events_rx, &mut counts);

            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received");
                break false;
            }

            if queue.is_quiescent() {
                // Every task has released its guard after sending its events
                self.drain(&events_rx, &mut counts);
                break true;
            }

            if workers.iter().all(|w| w.is_finished()) {
                let pending = queue.pending() as usize;
                for worker in &mut workers {
                    if let Err(e) = worker.join() {
                        warn!(error = %e, "Worker failed");
                    }
                }
                self.drain(&events_rx, &mut counts);
                warn!(pending, "All workers have terminated with work pending");
                return Err(WorkerError::AllWorkersDead { pending }.into());
            }

            if last_progress.elapsed() >= PROGRESS_INTERVAL {
                last_progress = Instant::now();
                on_progress(&ScanProgress {
                    totals: aggregate_stats(&workers),
                    errors: counts.errors,
                    mismatches: counts.mismatches,
                    pending: queue.pending(),
                    active_workers: counts.active(),
                    total_workers: worker_count,
                    elapsed: start_time.elapsed(),
                });
            }
        };

        // One quit per worker; on interrupt the flag already tells them
        for _ in 0..workers.len() {
            queue.quit();
        }

        for worker in &mut workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed");
                worker_failures += 1;
            }
        }
        self.drain(&events_rx, &mut counts);

        let totals = aggregate_stats(&workers);
        let duration = start_time.elapsed();

        let summary = ScanSummary {
            visited: totals.visited,
            dirs_expanded: totals.dirs_expanded,
            files_cataloged: totals.files_cataloged,
            files_unchanged: totals.files_unchanged,
            metadata_inserted: totals.metadata_inserted,
            dedup_hits: totals.dedup_hits,
            skipped: totals.skipped,
            mismatches: counts.mismatches,
            errors: counts.errors,
            worker_failures,
            bytes_identified: totals.bytes_identified,
            duration,
            completed,
        };

        info!(
            visited = summary.visited,
            cataloged = summary.files_cataloged,
            unchanged = summary.files_unchanged,
            errors = summary.errors,
            duration_secs = duration.as_secs(),
            "Scan completed"
        );

        Ok(summary)
    }

    /// Push one task per root. Relative roots are resolved against the
    /// current working directory.
    fn seed_roots(&self, queue: &WorkQueue) -> Result<()> {
        let mut cwd: Option<PathBuf> = None;

        for root in &self.config.roots {
            let task = if root.is_absolute() {
                let source = self.source_for(root);
                ScanTask::root(root.clone(), source)
            } else {
                let base = match &cwd {
                    Some(dir) => dir.clone(),
                    None => {
                        let dir = std::env::current_dir()?;
                        cwd = Some(dir.clone());
                        dir
                    }
                };
                let source = self.source_for(&base.join(root));
                ScanTask {
                    base: Some(base),
                    name: root.clone(),
                    source: source.into(),
                }
            };

            debug!(path = %task.full_path().display(), source = %task.source, "Adding root");
            queue.seed(task);
        }
        Ok(())
    }

    fn source_for(&self, root: &Path) -> String {
        match &self.config.source {
            Some(label) => label.clone(),
            None => source_label(root),
        }
    }

    fn drain(&self, events: &EventReceiver, counts: &mut EventCounts) {
        for event in events.drain() {
            self.observe(&event, counts);
        }
    }

    fn observe(&self, event: &ResultEvent, counts: &mut EventCounts) {
        match event {
            ResultEvent::Working(id) => counts.set_working(*id, true),
            ResultEvent::Idle(id) | ResultEvent::Stopping(id) => counts.set_working(*id, false),
            ResultEvent::Mismatch(..) => counts.mismatches += 1,
            _ => {}
        }
        if event.is_error() {
            counts.errors += 1;
        }

        if self.config.verbose {
            info!(event = %event, "Crawl event");
        } else if event.is_error() || matches!(event, ResultEvent::Mismatch(..)) {
            warn!(event = %event, "Crawl problem");
        } else {
            debug!(event = %event, "Crawl event");
        }
    }
}

/// Default source label for a root: its final path component
pub fn source_label(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.to_string_lossy().into_owned())
}
