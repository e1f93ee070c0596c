//! Persistent catalog of path and content facts
//!
//! The catalog holds two kinds of facts:
//! - **Path entries**: `(path, source, size, mtime_ns) -> content_hash`.
//!   Append-only, so a path that changes over time keeps its history.
//! - **Metadata records**: `content_hash -> metadata`, one per distinct
//!   content hash no matter how many paths reference it.
//!
//! The crawl engine talks to the catalog only through the [`Catalog`] trait.
//! Each worker opens its own session through a [`CatalogConnector`], so
//! implementations must tolerate concurrent sessions racing on the same path
//! or content hash.
//!
//! ```text
//!  Worker 1 ──┐                       ┌──────────────────────┐
//!  Worker 2 ──┼── connect() ────────► │  SqliteCatalog (WAL) │
//!  Worker N ──┘   (one session each)  │  paths | meta | info │
//!                                     └──────────────────────┘
//! ```

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::{drop_catalog, CatalogInfo, SqliteCatalog, SqliteConnector, TableInfo};

use crate::error::CatalogResult;
use serde::{Deserialize, Serialize};

/// Free-form structured metadata extracted from file content
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A path-level fact: this path, under this source, had this content
/// when it had this size and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Full path of the file
    pub path: String,

    /// Logical source-tree label
    pub source: String,

    /// Size in bytes at identification time
    pub size: u64,

    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: i64,

    /// Content hash (hex)
    pub content_hash: String,
}

/// A stored entry as returned by [`Catalog::lookup_entries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub size: u64,
    pub mtime_ns: i64,
    pub content_hash: String,
}

impl StoredEntry {
    /// Whether this entry was recorded for exactly this stat
    pub fn matches(&self, size: u64, mtime_ns: i64) -> bool {
        self.size == size && self.mtime_ns == mtime_ns
    }
}

/// A content-level fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub content_hash: String,
    pub metadata: Metadata,
}

/// Result of an insert-if-absent operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,

    /// A row with the same key already existed; nothing was written
    AlreadyPresent,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        *self == InsertOutcome::Inserted
    }
}

/// Metadata state of a content hash after [`Catalog::record_file`]
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataStatus {
    /// This call stored the metadata
    Inserted,

    /// A record already existed (possibly written by a racing session);
    /// it was left untouched
    Existing(Metadata),
}

/// One session with the catalog. Not shared across workers.
pub trait Catalog {
    /// All stored entries for `path` under `source`
    fn lookup_entries(&mut self, path: &str, source: &str) -> CatalogResult<Vec<StoredEntry>>;

    /// Append a path entry. Never removes older entries for the same path.
    fn insert_entry(&mut self, entry: &CatalogEntry) -> CatalogResult<InsertOutcome>;

    /// Metadata stored for a content hash, if any
    fn lookup_metadata(&mut self, content_hash: &str) -> CatalogResult<Option<Metadata>>;

    /// Insert metadata for a content hash if no record exists yet
    fn insert_metadata(
        &mut self,
        content_hash: &str,
        metadata: &Metadata,
    ) -> CatalogResult<InsertOutcome>;

    /// Record one identified file: insert its metadata if absent, then
    /// append its path entry.
    ///
    /// The path entry is written last, so a failure on the way leaves no
    /// entry behind and the file is identified again on the next crawl.
    /// Implementations that can should make the whole call atomic.
    fn record_file(
        &mut self,
        entry: &CatalogEntry,
        metadata: &Metadata,
    ) -> CatalogResult<MetadataStatus> {
        let hash = &entry.content_hash;
        let status = match self.lookup_metadata(hash)? {
            Some(stored) => MetadataStatus::Existing(stored),
            None => match self.insert_metadata(hash, metadata)? {
                InsertOutcome::Inserted => MetadataStatus::Inserted,
                // Lost the race to another session
                InsertOutcome::AlreadyPresent => {
                    MetadataStatus::Existing(self.lookup_metadata(hash)?.unwrap_or_default())
                }
            },
        };
        self.insert_entry(entry)?;
        Ok(status)
    }
}

/// Opens catalog sessions. Shared by all workers; each worker calls
/// `connect` once, on its own thread.
pub trait CatalogConnector: Send + Sync + 'static {
    type Session: Catalog;

    fn connect(&self) -> CatalogResult<Self::Session>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_entry_matches() {
        let stored = StoredEntry {
            size: 100,
            mtime_ns: 1_700_000_000_000_000_001,
            content_hash: "abc".into(),
        };
        assert!(stored.matches(100, 1_700_000_000_000_000_001));
        assert!(!stored.matches(100, 1_700_000_000_000_000_000));
        assert!(!stored.matches(101, 1_700_000_000_000_000_001));
    }
}
