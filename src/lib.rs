//! fscatalog - Concurrent File-Cataloging Crawler
//!
//! Walks local directory trees, identifies each file's content (content
//! hash plus metadata such as type, image dimensions and EXIF fields) and
//! records it in a SQLite catalog so files can later be searched by path
//! and inspected without re-reading them.
//!
//! # Features
//!
//! - **Parallel Crawling**: A fixed pool of worker threads shares an
//!   unbounded work queue; each worker owns its own catalog session.
//!
//! - **Incremental**: Files whose size and mtime are already cataloged are
//!   neither re-hashed nor re-identified.
//!
//! - **Deduplicated Metadata**: Metadata is stored once per content hash, no
//!   matter how many paths hold the same bytes.
//!
//! - **Exact Termination**: A pending-work counter tells the coordinator
//!   when the whole tree has been processed.
//!
//! # Architecture
//!
//! ```text
//!  roots ──► ScanCoordinator ──seed──► WorkQueue ◄──push children──┐
//!                 ▲                        │                        │
//!                 │ ResultEvents           ▼ pop                    │
//!                 └──────────────── Worker 1..N ────────────────────┘
//!                                          │
//!                          Identifier      │      Catalog (SQLite, WAL)
//!                    (hash, type, EXIF) ◄──┴──► paths | meta | catalog_info
//! ```
//!
//! # Example
//!
//! ```bash
//! fscatalog init
//! fscatalog scan ~/Pictures -w 8
//! fscatalog search '\.jpe?g$'
//! ```

pub mod catalog;
pub mod config;
pub mod crawl;
pub mod error;
pub mod format;
pub mod identify;
pub mod progress;
pub mod search;

pub use catalog::{Catalog, CatalogConnector, MemoryCatalog, SqliteCatalog, SqliteConnector};
pub use config::{CliArgs, ScanConfig, Settings};
pub use crawl::{scan, ScanCoordinator, ScanSummary};
pub use error::{CrawlError, Result};
pub use identify::{FileIdentifier, Identifier};
