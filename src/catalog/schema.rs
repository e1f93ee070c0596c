//! Catalog schema definitions and creation
//!
//! This module defines the SQLite schema for the catalog and provides
//! functions to create and configure it.

use crate::error::CatalogResult;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// Tables owned by the catalog, in dump/info order
pub const TABLES: &[&str] = &["paths", "meta", "catalog_info"];

/// Path history. One row per (path, source, size, mtime) ever observed.
const CREATE_PATHS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS paths (
    path TEXT NOT NULL,
    source TEXT NOT NULL,
    bytes INTEGER NOT NULL,
    mtime_ns INTEGER NOT NULL,    -- nanoseconds since Unix epoch
    content_hash TEXT NOT NULL,
    PRIMARY KEY (path, source, bytes, mtime_ns)
)
"#;

/// Content-addressed metadata. One row per distinct content hash.
const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    content_hash TEXT PRIMARY KEY,
    metadata TEXT NOT NULL        -- JSON object
)
"#;

/// SQL to create catalog metadata table
const CREATE_INFO_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_info (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_paths_hash ON paths(content_hash)",
    "CREATE INDEX IF NOT EXISTS idx_paths_source ON paths(source)",
];

/// Pragmas applied once, when the catalog file is created.
/// WAL lets every worker hold its own connection.
const CREATE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA page_size = 4096;
"#;

/// Pragmas applied to every session
const SESSION_PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;
PRAGMA cache_size = -16000;      -- 16MB cache per session
"#;

/// Create the catalog tables and indexes (idempotent)
pub fn create_catalog(conn: &Connection) -> CatalogResult<()> {
    conn.execute_batch(CREATE_PRAGMAS)?;

    conn.execute(CREATE_PATHS_TABLE, [])?;
    conn.execute(CREATE_META_TABLE, [])?;
    conn.execute(CREATE_INFO_TABLE, [])?;

    for sql in CREATE_INDEXES {
        conn.execute(sql, [])?;
    }

    if get_info(conn, keys::SCHEMA_VERSION)?.is_none() {
        set_info(conn, keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
        set_info(conn, keys::CREATED_AT, &chrono::Utc::now().to_rfc3339())?;
    }

    Ok(())
}

/// Apply per-session settings
pub fn configure_session(conn: &Connection) -> CatalogResult<()> {
    conn.execute_batch(SESSION_PRAGMAS)?;
    Ok(())
}

/// Whether the catalog tables exist
pub fn is_initialized(conn: &Connection) -> CatalogResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('paths', 'meta')",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 2)
}

/// Store catalog metadata
pub fn set_info(conn: &Connection, key: &str, value: &str) -> CatalogResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO catalog_info (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Get catalog metadata
pub fn get_info(conn: &Connection, key: &str) -> CatalogResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM catalog_info WHERE key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Keys used in `catalog_info`
pub mod keys {
    /// Schema version
    pub const SCHEMA_VERSION: &str = "schema_version";

    /// Timestamp when the catalog was created (RFC 3339)
    pub const CREATED_AT: &str = "created_at";

    /// Crawler version that last wrote the catalog
    pub const CRAWLER_VERSION: &str = "crawler_version";

    /// Roots of the most recent scan, newline separated
    pub const LAST_SCAN_ROOTS: &str = "last_scan_roots";

    /// Timestamp when the most recent scan started
    pub const LAST_SCAN_START: &str = "last_scan_start";

    /// Timestamp when the most recent scan ended
    pub const LAST_SCAN_END: &str = "last_scan_end";

    /// Entries visited by the most recent scan
    pub const LAST_SCAN_VISITED: &str = "last_scan_visited";

    /// Errors reported by the most recent scan
    pub const LAST_SCAN_ERRORS: &str = "last_scan_errors";

    /// Scan status: "running", "completed", "interrupted"
    pub const LAST_SCAN_STATUS: &str = "last_scan_status";
}
