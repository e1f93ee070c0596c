//! In-memory catalog
//!
//! Implements the same contract as the SQLite catalog on top of a shared,
//! mutex-protected map. Used for dry runs and tests; it also counts writes
//! so incremental behaviour can be asserted.

use crate::catalog::{
    Catalog, CatalogConnector, CatalogEntry, InsertOutcome, Metadata, MetadataRecord,
    MetadataStatus, StoredEntry,
};
use crate::error::CatalogResult;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// (path, source, size, mtime_ns)
type EntryKey = (String, String, u64, i64);

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<EntryKey, String>,
    metadata: HashMap<String, Metadata>,
    entry_writes: u64,
    metadata_writes: u64,
}

/// Shared in-memory catalog. Cloning yields another session on the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All path entries, ordered by path
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let state = self.state.lock();
        state
            .entries
            .iter()
            .map(|((path, source, size, mtime_ns), hash)| CatalogEntry {
                path: path.clone(),
                source: source.clone(),
                size: *size,
                mtime_ns: *mtime_ns,
                content_hash: hash.clone(),
            })
            .collect()
    }

    /// All metadata records, ordered by content hash
    pub fn metadata_records(&self) -> Vec<MetadataRecord> {
        let state = self.state.lock();
        let mut records: Vec<_> = state
            .metadata
            .iter()
            .map(|(hash, metadata)| MetadataRecord {
                content_hash: hash.clone(),
                metadata: metadata.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.content_hash.cmp(&b.content_hash));
        records
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn metadata_count(&self) -> usize {
        self.state.lock().metadata.len()
    }

    /// Number of successful inserts (entries + metadata) since creation
    pub fn write_count(&self) -> u64 {
        let state = self.state.lock();
        state.entry_writes + state.metadata_writes
    }

    /// Seed a path entry directly (test setup)
    pub fn seed_entry(&self, entry: CatalogEntry) {
        let mut state = self.state.lock();
        state.entries.insert(
            (entry.path, entry.source, entry.size, entry.mtime_ns),
            entry.content_hash,
        );
    }

    /// Seed a metadata record directly (test setup)
    pub fn seed_metadata(&self, content_hash: &str, metadata: Metadata) {
        self.state
            .lock()
            .metadata
            .insert(content_hash.to_string(), metadata);
    }
}

impl CatalogConnector for MemoryCatalog {
    type Session = MemoryCatalog;

    fn connect(&self) -> CatalogResult<MemoryCatalog> {
        Ok(self.clone())
    }
}

impl Catalog for MemoryCatalog {
    fn lookup_entries(&mut self, path: &str, source: &str) -> CatalogResult<Vec<StoredEntry>> {
        let state = self.state.lock();
        Ok(state
            .entries
            .iter()
            .filter(|((p, s, _, _), _)| p == path && s == source)
            .map(|((_, _, size, mtime_ns), hash)| StoredEntry {
                size: *size,
                mtime_ns: *mtime_ns,
                content_hash: hash.clone(),
            })
            .collect())
    }

    fn insert_entry(&mut self, entry: &CatalogEntry) -> CatalogResult<InsertOutcome> {
        let mut state = self.state.lock();
        let key = (
            entry.path.clone(),
            entry.source.clone(),
            entry.size,
            entry.mtime_ns,
        );
        if state.entries.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        state.entries.insert(key, entry.content_hash.clone());
        state.entry_writes += 1;
        Ok(InsertOutcome::Inserted)
    }

    fn lookup_metadata(&mut self, content_hash: &str) -> CatalogResult<Option<Metadata>> {
        Ok(self.state.lock().metadata.get(content_hash).cloned())
    }

    fn insert_metadata(
        &mut self,
        content_hash: &str,
        metadata: &Metadata,
    ) -> CatalogResult<InsertOutcome> {
        let mut state = self.state.lock();
        if state.metadata.contains_key(content_hash) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        state
            .metadata
            .insert(content_hash.to_string(), metadata.clone());
        state.metadata_writes += 1;
        Ok(InsertOutcome::Inserted)
    }

    fn record_file(
        &mut self,
        entry: &CatalogEntry,
        metadata: &Metadata,
    ) -> CatalogResult<MetadataStatus> {
        // One lock for both writes
        let mut state = self.state.lock();
        let hash = &entry.content_hash;

        let status = match state.metadata.get(hash) {
            Some(stored) => MetadataStatus::Existing(stored.clone()),
            None => {
                state.metadata.insert(hash.clone(), metadata.clone());
                state.metadata_writes += 1;
                MetadataStatus::Inserted
            }
        };

        let key = (
            entry.path.clone(),
            entry.source.clone(),
            entry.size,
            entry.mtime_ns,
        );
        if !state.entries.contains_key(&key) {
            state.entries.insert(key, hash.clone());
            state.entry_writes += 1;
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sessions_share_state() {
        let catalog = MemoryCatalog::new();
        let mut a = catalog.connect().unwrap();
        let mut b = catalog.connect().unwrap();

        a.insert_entry(&CatalogEntry {
            path: "/x".into(),
            source: "s".into(),
            size: 1,
            mtime_ns: 1,
            content_hash: "h".into(),
        })
        .unwrap();

        assert_eq!(b.lookup_entries("/x", "s").unwrap().len(), 1);
        assert_eq!(catalog.entry_count(), 1);
        assert_eq!(catalog.write_count(), 1);
    }

    #[test]
    fn test_metadata_not_overwritten() {
        let mut catalog = MemoryCatalog::new();
        let mut first = Metadata::new();
        first.insert("format".into(), json!("PNG"));

        assert!(catalog.insert_metadata("h", &first).unwrap().is_inserted());
        assert_eq!(
            catalog.insert_metadata("h", &Metadata::new()).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(catalog.lookup_metadata("h").unwrap(), Some(first));
        assert_eq!(catalog.write_count(), 1);
    }

    #[test]
    fn test_record_file() {
        let mut catalog = MemoryCatalog::new();
        let mut metadata = Metadata::new();
        metadata.insert("format".into(), json!("text"));
        let entry = |path: &str| CatalogEntry {
            path: path.into(),
            source: "s".into(),
            size: 4,
            mtime_ns: 7,
            content_hash: "h".into(),
        };

        assert_eq!(
            catalog.record_file(&entry("/a"), &metadata).unwrap(),
            MetadataStatus::Inserted
        );
        assert_eq!(
            catalog.record_file(&entry("/b"), &Metadata::new()).unwrap(),
            MetadataStatus::Existing(metadata.clone())
        );
        // Repeating a file adds nothing
        catalog.record_file(&entry("/b"), &metadata).unwrap();

        assert_eq!(catalog.entry_count(), 2);
        assert_eq!(catalog.metadata_count(), 1);
        assert_eq!(catalog.write_count(), 3);
    }
}
