//! SQLite-backed catalog
//!
//! Every worker opens its own [`SqliteCatalog`] session on the same file.
//! The file is in WAL mode and each session waits on a busy timeout, so
//! concurrent writers serialize inside SQLite instead of failing.
//! Insert-if-absent is `INSERT OR IGNORE` against the primary keys, which
//! makes racing inserts for the same content hash harmless.

use crate::catalog::schema::{self, keys};
use crate::catalog::{
    Catalog, CatalogConnector, CatalogEntry, InsertOutcome, Metadata, MetadataStatus, StoredEntry,
};
use crate::error::{CatalogError, CatalogResult};
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default time a session waits for a competing writer
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens [`SqliteCatalog`] sessions on one catalog file
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogConnector for SqliteConnector {
    type Session = SqliteCatalog;

    fn connect(&self) -> CatalogResult<SqliteCatalog> {
        SqliteCatalog::open_with_timeout(&self.path, self.busy_timeout)
    }
}

/// Row count and column description of one catalog table
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub rows: u64,
    /// (column name, declared type)
    pub columns: Vec<(String, String)>,
}

/// Summary of the catalog for `fscatalog info`
#[derive(Debug, Clone)]
pub struct CatalogInfo {
    pub sqlite_version: String,
    pub path: PathBuf,
    pub file_size: Option<u64>,
    pub tables: Vec<TableInfo>,
}

/// One session with a SQLite catalog file
pub struct SqliteCatalog {
    conn: Connection,
    path: PathBuf,
}

impl SqliteCatalog {
    /// Create the catalog file (and schema) if needed, then open it
    pub fn create(path: &Path) -> CatalogResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CatalogError::OpenFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|e| CatalogError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        schema::create_catalog(&conn)?;
        schema::configure_session(&conn)?;
        register_regexp(&conn)?;
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing, initialized catalog
    pub fn open(path: &Path) -> CatalogResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    fn open_with_timeout(path: &Path, busy_timeout: Duration) -> CatalogResult<Self> {
        if !path.exists() {
            return Err(CatalogError::NotInitialized(path.to_path_buf()));
        }

        let conn = Connection::open(path).map_err(|e| CatalogError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(busy_timeout)?;

        if !schema::is_initialized(&conn)? {
            return Err(CatalogError::NotInitialized(path.to_path_buf()));
        }
        schema::configure_session(&conn)?;
        register_regexp(&conn)?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Path of the catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Underlying connection (read-only helpers and tests)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Record the start of a scan in `catalog_info`
    pub fn record_scan_start(&self, roots: &[String]) -> CatalogResult<()> {
        schema::set_info(&self.conn, keys::CRAWLER_VERSION, env!("CARGO_PKG_VERSION"))?;
        schema::set_info(&self.conn, keys::LAST_SCAN_ROOTS, &roots.join("\n"))?;
        schema::set_info(
            &self.conn,
            keys::LAST_SCAN_START,
            &chrono::Utc::now().to_rfc3339(),
        )?;
        schema::set_info(&self.conn, keys::LAST_SCAN_STATUS, "running")?;
        Ok(())
    }

    /// Record the end of a scan in `catalog_info`
    pub fn record_scan_end(&self, visited: u64, errors: u64, completed: bool) -> CatalogResult<()> {
        schema::set_info(
            &self.conn,
            keys::LAST_SCAN_END,
            &chrono::Utc::now().to_rfc3339(),
        )?;
        schema::set_info(&self.conn, keys::LAST_SCAN_VISITED, &visited.to_string())?;
        schema::set_info(&self.conn, keys::LAST_SCAN_ERRORS, &errors.to_string())?;
        schema::set_info(
            &self.conn,
            keys::LAST_SCAN_STATUS,
            if completed { "completed" } else { "interrupted" },
        )?;
        Ok(())
    }

    /// All entries whose path matches `pattern`, ordered by path
    pub fn search(&self, pattern: &Regex) -> CatalogResult<Vec<CatalogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, source, bytes, mtime_ns, content_hash FROM paths \
             WHERE path REGEXP ?1 \
             ORDER BY path, source, mtime_ns",
        )?;

        let rows = stmt.query_map([pattern.as_str()], |row| {
            Ok(CatalogEntry {
                path: row.get(0)?,
                source: row.get(1)?,
                size: row.get::<_, i64>(2)? as u64,
                mtime_ns: row.get(3)?,
                content_hash: row.get(4)?,
            })
        })?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }

    /// Version, row counts and column layout of the catalog
    pub fn info(&self) -> CatalogResult<CatalogInfo> {
        let sqlite_version: String =
            self.conn
                .query_row("SELECT sqlite_version()", [], |row| row.get(0))?;

        let mut tables = Vec::with_capacity(schema::TABLES.len());
        for name in schema::TABLES {
            let rows: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", name), [], |row| {
                        row.get(0)
                    })?;

            let mut stmt = self
                .conn
                .prepare("SELECT name, type FROM pragma_table_info(?1)")?;
            let columns = stmt
                .query_map([*name], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<(String, String)>, _>>()?;

            tables.push(TableInfo {
                name: name.to_string(),
                rows: rows as u64,
                columns,
            });
        }

        Ok(CatalogInfo {
            sqlite_version,
            path: self.path.clone(),
            file_size: std::fs::metadata(&self.path).ok().map(|m| m.len()),
            tables,
        })
    }

    /// Every row of a catalog table, rendered as text
    pub fn dump(&self, table: &str) -> CatalogResult<Vec<Vec<String>>> {
        if !schema::TABLES.contains(&table) {
            return Err(CatalogError::UnknownTable(table.to_string()));
        }

        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {}", table))?;
        let width = stmt.column_count();
        let rows = stmt.query_map([], |row| {
            (0..width)
                .map(|i| row.get_ref(i).map(render_value))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

impl Catalog for SqliteCatalog {
    fn lookup_entries(&mut self, path: &str, source: &str) -> CatalogResult<Vec<StoredEntry>> {
        ConnSession(&self.conn).lookup_entries(path, source)
    }

    fn insert_entry(&mut self, entry: &CatalogEntry) -> CatalogResult<InsertOutcome> {
        ConnSession(&self.conn).insert_entry(entry)
    }

    fn lookup_metadata(&mut self, content_hash: &str) -> CatalogResult<Option<Metadata>> {
        ConnSession(&self.conn).lookup_metadata(content_hash)
    }

    fn insert_metadata(
        &mut self,
        content_hash: &str,
        metadata: &Metadata,
    ) -> CatalogResult<InsertOutcome> {
        ConnSession(&self.conn).insert_metadata(content_hash, metadata)
    }

    /// Both rows in one immediate transaction; an error rolls both back
    fn record_file(
        &mut self,
        entry: &CatalogEntry,
        metadata: &Metadata,
    ) -> CatalogResult<MetadataStatus> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let status = ConnSession(&tx).record_file(entry, metadata)?;
        tx.commit()?;
        Ok(status)
    }
}

/// Catalog operations on a borrowed connection or open transaction
struct ConnSession<'a>(&'a Connection);

impl Catalog for ConnSession<'_> {
    fn lookup_entries(&mut self, path: &str, source: &str) -> CatalogResult<Vec<StoredEntry>> {
        let mut stmt = self.0.prepare_cached(
            "SELECT bytes, mtime_ns, content_hash FROM paths WHERE path = ?1 AND source = ?2",
        )?;

        let rows = stmt.query_map(params![path, source], |row| {
            Ok(StoredEntry {
                size: row.get::<_, i64>(0)? as u64,
                mtime_ns: row.get(1)?,
                content_hash: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn insert_entry(&mut self, entry: &CatalogEntry) -> CatalogResult<InsertOutcome> {
        let mut stmt = self.0.prepare_cached(
            "INSERT OR IGNORE INTO paths (path, source, bytes, mtime_ns, content_hash) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        let changed = stmt.execute(params![
            entry.path,
            entry.source,
            entry.size as i64,
            entry.mtime_ns,
            entry.content_hash,
        ])?;

        Ok(insert_outcome(changed))
    }

    fn lookup_metadata(&mut self, content_hash: &str) -> CatalogResult<Option<Metadata>> {
        let mut stmt = self
            .0
            .prepare_cached("SELECT metadata FROM meta WHERE content_hash = ?1")?;

        let raw: Option<String> = stmt
            .query_row([content_hash], |row| row.get(0))
            .optional()?;

        raw.map(|text| {
            serde_json::from_str(&text).map_err(|source| CatalogError::Json {
                content_hash: content_hash.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn insert_metadata(
        &mut self,
        content_hash: &str,
        metadata: &Metadata,
    ) -> CatalogResult<InsertOutcome> {
        let text = serde_json::to_string(metadata).map_err(|source| CatalogError::Json {
            content_hash: content_hash.to_string(),
            source,
        })?;

        let mut stmt = self.0.prepare_cached(
            "INSERT OR IGNORE INTO meta (content_hash, metadata) VALUES (?1, ?2)",
        )?;
        let changed = stmt.execute(params![content_hash, text])?;

        Ok(insert_outcome(changed))
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Register `regexp(pattern, text)`, which backs `text REGEXP pattern`.
/// The compiled pattern is cached per statement.
fn register_regexp(conn: &Connection) -> CatalogResult<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |raw| -> Result<_, BoxError> {
                Ok(Regex::new(raw.as_str()?)?)
            })?;
            let text = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(pattern.is_match(text))
        },
    )?;
    Ok(())
}

fn insert_outcome(changed: usize) -> InsertOutcome {
    if changed > 0 {
        InsertOutcome::Inserted
    } else {
        InsertOutcome::AlreadyPresent
    }
}

/// Delete a catalog file together with its WAL side files
pub fn drop_catalog(path: &Path) -> CatalogResult<bool> {
    let mut removed = false;
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = PathBuf::from(file);
        if file.exists() {
            std::fs::remove_file(&file).map_err(|e| CatalogError::OpenFailed {
                path: file.clone(),
                reason: e.to_string(),
            })?;
            removed = true;
        }
    }
    Ok(removed)
}
