//! Concurrent crawl engine
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │    ScanCoordinator      │
//!                     │  - seeds roots          │
//!                     │  - counts events        │
//!                     │  - detects quiescence   │
//!                     └──────┬──────────▲───────┘
//!                 WorkQueue  │          │  ResultEvent channel
//!       ┌────────────────────┼──────────┼──────────────┐
//!       │                    │          │              │
//! ┌─────▼─────┐        ┌─────▼─────┐        ┌─────▼─────┐
//! │  Worker 1 │        │  Worker 2 │        │  Worker N │
//! │  stat     │        │  stat     │        │  stat     │
//! │  identify │        │  identify │        │  identify │
//! │  catalog  │        │  catalog  │        │  catalog  │
//! └───────────┘        └───────────┘        └───────────┘
//! ```
//!
//! Directories are expanded back into the queue; files go through the
//! incremental decision in [`worker::catalog_file`].

pub mod coordinator;
pub mod event;
pub mod queue;
pub mod worker;

pub use coordinator::{source_label, ScanCoordinator, ScanProgress, ScanSummary};
pub use event::ResultEvent;
pub use queue::{ScanTask, WorkQueue};
pub use worker::{Worker, WorkerStats};

use crate::catalog::CatalogConnector;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::identify::Identifier;
use std::path::PathBuf;

/// Crawl `roots` with `worker_count` workers and default settings
pub fn scan<C, I>(
    roots: Vec<PathBuf>,
    worker_count: usize,
    connector: C,
    identifier: I,
) -> Result<ScanSummary>
where
    C: CatalogConnector,
    I: Identifier + Clone,
{
    let config = ScanConfig::new(roots).workers(worker_count);
    ScanCoordinator::new(config, connector, identifier)?.run()
}
