//! Integration tests for fscatalog
//!
//! These crawl real temporary directory trees into in-memory and SQLite
//! catalogs.

use fscatalog::catalog::{
    Catalog, CatalogConnector, CatalogEntry, InsertOutcome, MemoryCatalog, Metadata,
    SqliteCatalog, SqliteConnector, StoredEntry,
};
use fscatalog::config::ScanConfig;
use fscatalog::crawl::{scan, ScanCoordinator, ScanSummary};
use fscatalog::error::{CatalogError, CatalogResult, CrawlError, IdentifyResult, WorkerError};
use fscatalog::identify::checksum::hash_bytes;
use fscatalog::identify::{FileIdentifier, Identification, Identifier};
use filetime::{set_file_mtime, FileTime};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn identifier() -> FileIdentifier {
    FileIdentifier::new().without_external_tools()
}

/// `<tmp>/data` with identical `a.txt` and `b.txt` and an empty `sub/`
fn data_tree() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a.txt"), b"same content\n").unwrap();
    fs::write(data.join("b.txt"), b"same content\n").unwrap();
    fs::create_dir(data.join("sub")).unwrap();
    (dir, data)
}

fn crawl(root: &Path, workers: usize, catalog: &MemoryCatalog) -> ScanSummary {
    scan(vec![root.to_path_buf()], workers, catalog.clone(), identifier()).unwrap()
}

#[test]
fn test_dedup_scenario() {
    let (_dir, data) = data_tree();
    let catalog = MemoryCatalog::new();

    let summary = crawl(&data, 4, &catalog);

    assert!(summary.completed);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.visited, 4);
    assert_eq!(summary.dirs_expanded, 2);
    assert_eq!(summary.files_cataloged, 2);
    assert_eq!(summary.metadata_inserted, 1);
    assert_eq!(summary.dedup_hits, 1);
    assert_eq!(catalog.entry_count(), 2);
    assert_eq!(catalog.metadata_count(), 1);

    let entries = catalog.entries();
    assert!(entries.iter().all(|e| e.source == "data"));
    assert!(entries.iter().all(|e| e.content_hash == hash_bytes(b"same content\n")));
}

#[test]
fn test_missing_root() {
    let dir = tempdir().unwrap();
    let catalog = MemoryCatalog::new();

    let summary = crawl(&dir.path().join("does-not-exist"), 2, &catalog);

    assert!(summary.completed);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.visited, 1);
    assert_eq!(catalog.entry_count(), 0);
}

#[test]
fn test_second_scan_writes_nothing() {
    let (_dir, data) = data_tree();
    let catalog = MemoryCatalog::new();

    crawl(&data, 3, &catalog);
    let writes = catalog.write_count();
    assert_eq!(writes, 3);

    let summary = crawl(&data, 3, &catalog);
    assert_eq!(catalog.write_count(), writes);
    assert_eq!(summary.files_unchanged, 2);
    assert_eq!(summary.files_cataloged, 0);
}

#[test]
fn test_same_size_new_mtime_is_reidentified() {
    let (_dir, data) = data_tree();
    let catalog = MemoryCatalog::new();
    let a = data.join("a.txt");
    set_file_mtime(&a, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    crawl(&data, 2, &catalog);

    // Same length, different bytes, different mtime
    fs::write(&a, b"SAME CONTENT\n").unwrap();
    set_file_mtime(&a, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let summary = crawl(&data, 2, &catalog);
    assert_eq!(summary.files_cataloged, 1);
    assert_eq!(summary.files_unchanged, 1);
    assert_eq!(summary.metadata_inserted, 1);

    // History is kept: both states of a.txt are cataloged
    let a_str = a.to_string_lossy();
    let history: Vec<_> = catalog
        .entries()
        .into_iter()
        .filter(|e| e.path == a_str)
        .collect();
    assert_eq!(history.len(), 2);
    assert_eq!(catalog.metadata_count(), 2);
}

#[cfg(unix)]
#[test]
fn test_socket_is_skipped() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("sockets");
    fs::create_dir(&root).unwrap();
    let _listener = std::os::unix::net::UnixListener::bind(root.join("s.sock")).unwrap();

    let catalog = MemoryCatalog::new();
    let summary = crawl(&root, 2, &catalog);

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(catalog.entry_count(), 0);
    assert_eq!(catalog.metadata_count(), 0);
}

#[test]
fn test_metadata_mismatch_is_reported_not_overwritten() {
    let (_dir, data) = data_tree();
    let catalog = MemoryCatalog::new();

    let mut planted = Metadata::new();
    planted.insert("format".into(), json!("NOT TEXT"));
    catalog.seed_metadata(&hash_bytes(b"same content\n"), planted.clone());

    let summary = crawl(&data, 1, &catalog);

    assert_eq!(summary.mismatches, 2);
    assert_eq!(summary.errors, 0);
    assert_eq!(catalog.entry_count(), 2);
    let records = catalog.metadata_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].metadata, planted);
}

/// Identifier that panics on files named `boom`
#[derive(Clone)]
struct ExplodingIdentifier(FileIdentifier);

impl Identifier for ExplodingIdentifier {
    fn identify(&mut self, path: &Path) -> IdentifyResult<Identification> {
        if path.file_name().is_some_and(|n| n == "boom") {
            panic!("identifier exploded");
        }
        self.0.identify(path)
    }
}

#[test]
fn test_task_panic_becomes_error_event() {
    let (_dir, data) = data_tree();
    fs::write(data.join("boom"), b"x").unwrap();
    let catalog = MemoryCatalog::new();

    let summary = scan(
        vec![data.clone()],
        1,
        catalog.clone(),
        ExplodingIdentifier(identifier()),
    )
    .unwrap();

    assert!(summary.completed);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.worker_failures, 0);
    // The single worker kept going after the panic
    assert_eq!(catalog.entry_count(), 2);
}

/// Connector whose sessions can never be opened
struct UnavailableCatalog;

impl CatalogConnector for UnavailableCatalog {
    type Session = MemoryCatalog;

    fn connect(&self) -> CatalogResult<MemoryCatalog> {
        Err(CatalogError::OpenFailed {
            path: PathBuf::from("/nowhere/catalog.db"),
            reason: "unavailable".into(),
        })
    }
}

#[test]
fn test_all_workers_dead() {
    let (_dir, data) = data_tree();

    let result = scan(vec![data], 3, UnavailableCatalog, identifier());

    assert!(matches!(
        result,
        Err(CrawlError::Worker(WorkerError::AllWorkersDead { pending: 1 }))
    ));
}

/// Connector whose first session fails to open
#[derive(Clone)]
struct FirstConnectFails {
    inner: MemoryCatalog,
    connects: Arc<AtomicUsize>,
}

impl CatalogConnector for FirstConnectFails {
    type Session = MemoryCatalog;

    fn connect(&self) -> CatalogResult<MemoryCatalog> {
        if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(CatalogError::OpenFailed {
                path: PathBuf::from("/nowhere/catalog.db"),
                reason: "first session refused".into(),
            });
        }
        Ok(self.inner.clone())
    }
}

#[test]
fn test_one_worker_failure_does_not_stop_the_crawl() {
    let (_dir, data) = data_tree();
    for i in 0..10 {
        fs::write(data.join("sub").join(format!("f{}.txt", i)), format!("{}", i)).unwrap();
    }
    let catalog = MemoryCatalog::new();
    let connector = FirstConnectFails {
        inner: catalog.clone(),
        connects: Arc::new(AtomicUsize::new(0)),
    };

    let summary = scan(vec![data], 3, connector, identifier()).unwrap();

    assert!(summary.completed);
    assert_eq!(summary.worker_failures, 1);
    // The failed session is reported once
    assert_eq!(summary.errors, 1);
    assert_eq!(catalog.entry_count(), 12);
}

/// Session whose metadata writes fail while `failures` is above zero
#[derive(Clone)]
struct FlakyCatalog {
    inner: MemoryCatalog,
    failures: Arc<AtomicUsize>,
}

impl CatalogConnector for FlakyCatalog {
    type Session = FlakyCatalog;

    fn connect(&self) -> CatalogResult<FlakyCatalog> {
        Ok(self.clone())
    }
}

impl Catalog for FlakyCatalog {
    fn lookup_entries(&mut self, path: &str, source: &str) -> CatalogResult<Vec<StoredEntry>> {
        self.inner.lookup_entries(path, source)
    }

    fn insert_entry(&mut self, entry: &CatalogEntry) -> CatalogResult<InsertOutcome> {
        self.inner.insert_entry(entry)
    }

    fn lookup_metadata(&mut self, content_hash: &str) -> CatalogResult<Option<Metadata>> {
        self.inner.lookup_metadata(content_hash)
    }

    fn insert_metadata(
        &mut self,
        content_hash: &str,
        metadata: &Metadata,
    ) -> CatalogResult<InsertOutcome> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CatalogError::Sqlite(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_IOERR),
                Some("disk I/O error".into()),
            )));
        }
        self.inner.insert_metadata(content_hash, metadata)
    }
}

#[test]
fn test_failed_metadata_write_is_retried_next_crawl() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("one");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), b"only file").unwrap();

    let catalog = MemoryCatalog::new();
    let flaky = FlakyCatalog {
        inner: catalog.clone(),
        failures: Arc::new(AtomicUsize::new(1)),
    };

    let first = scan(vec![root.clone()], 1, flaky.clone(), identifier()).unwrap();
    assert_eq!(first.errors, 1);
    assert_eq!(first.files_cataloged, 0);
    // No path entry without its metadata
    assert_eq!(catalog.entry_count(), 0);
    assert_eq!(catalog.metadata_count(), 0);

    let second = scan(vec![root], 1, flaky, identifier()).unwrap();
    assert_eq!(second.errors, 0);
    assert_eq!(second.files_unchanged, 0);
    assert_eq!(second.files_cataloged, 1);
    assert_eq!(catalog.entry_count(), 1);
    assert_eq!(catalog.metadata_count(), 1);
}

#[test]
fn test_terminates_for_any_worker_count() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("tree");
    let mut files = 0;
    for a in 0..4 {
        for b in 0..3 {
            let leaf = root.join(format!("d{}", a)).join(format!("e{}", b));
            fs::create_dir_all(&leaf).unwrap();
            for c in 0..3 {
                fs::write(leaf.join(format!("f{}.txt", c)), format!("{}-{}-{}", a, b, c)).unwrap();
                files += 1;
            }
        }
    }

    for workers in [1, 2, 5, 16] {
        let catalog = MemoryCatalog::new();
        let summary = crawl(&root, workers, &catalog);

        assert!(summary.completed, "workers={}", workers);
        assert_eq!(summary.errors, 0, "workers={}", workers);
        assert_eq!(catalog.entry_count(), files, "workers={}", workers);
        assert_eq!(catalog.metadata_count(), files, "workers={}", workers);
        // root + 4 + 12 directories
        assert_eq!(summary.dirs_expanded, 17, "workers={}", workers);
        assert_eq!(summary.visited, 17 + files as u64, "workers={}", workers);
    }
}

#[test]
fn test_exclude_and_source_override() {
    let (_dir, data) = data_tree();
    fs::write(data.join("sub").join("skip.tmp"), b"tmp").unwrap();
    fs::write(data.join("sub").join("keep.txt"), b"keep").unwrap();

    let catalog = MemoryCatalog::new();
    let config = ScanConfig::new(vec![data.clone()])
        .workers(2)
        .source("nas")
        .exclude(r"\.tmp$")
        .unwrap();

    let summary = ScanCoordinator::new(config, catalog.clone(), identifier())
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.errors, 0);
    let entries = catalog.entries();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.source == "nas"));
    assert!(!entries.iter().any(|e| e.path.ends_with("skip.tmp")));
}

#[test]
fn test_sqlite_end_to_end() {
    let (dir, data) = data_tree();
    let db = dir.path().join("catalog.db");
    SqliteCatalog::create(&db).unwrap();

    let summary = scan(vec![data.clone()], 4, SqliteConnector::new(&db), identifier()).unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.files_cataloged, 2);

    let mut catalog = SqliteCatalog::open(&db).unwrap();
    let info = catalog.info().unwrap();
    let rows = |name: &str| info.tables.iter().find(|t| t.name == name).unwrap().rows;
    assert_eq!(rows("paths"), 2);
    assert_eq!(rows("meta"), 1);

    let a = data.join("a.txt").to_string_lossy().into_owned();
    let stored = catalog.lookup_entries(&a, "data").unwrap();
    assert_eq!(stored.len(), 1);
    let metadata = catalog.lookup_metadata(&stored[0].content_hash).unwrap().unwrap();
    assert_eq!(metadata["magic"], json!("text"));

    // Nothing changes on a second pass
    let again = scan(vec![data], 4, SqliteConnector::new(&db), identifier()).unwrap();
    assert_eq!(again.files_unchanged, 2);
    assert_eq!(again.files_cataloged, 0);
    assert_eq!(catalog.dump("paths").unwrap().len(), 2);
}

#[test]
fn test_catalog_entry_serializes() {
    let entry = CatalogEntry {
        path: "/data/a.txt".into(),
        source: "data".into(),
        size: 13,
        mtime_ns: 42,
        content_hash: "abc".into(),
    };
    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["source"], json!("data"));
    assert_eq!(value["mtime_ns"], json!(42));
}
