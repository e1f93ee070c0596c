//! Error types for fscatalog
//!
//! This module defines the error hierarchy for:
//! - Catalog (SQLite) errors
//! - Content identification errors
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Library code uses thiserror enums; the binary wraps them with anyhow
//! context. Per-entry failures during a crawl are never returned through
//! these types: they become events (see `crawl::event`).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Catalog errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Identification errors
    #[error("Identify error: {0}")]
    Identify(#[from] IdentifyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (working directory, catalog file, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored metadata could not be (de)serialized
    #[error("Metadata for '{content_hash}' is not valid JSON: {source}")]
    Json {
        content_hash: String,
        source: serde_json::Error,
    },

    /// Failed to open or create the catalog file
    #[error("Failed to open catalog at '{path}': {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Catalog has not been initialized
    #[error("Catalog at '{0}' is not initialized (run `fscatalog init`)")]
    NotInitialized(PathBuf),

    /// Unknown table requested for dump
    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    /// Invalid search expression
    #[error("Invalid search pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Content identification errors
#[derive(Error, Debug)]
pub enum IdentifyError {
    /// Failed to read file content
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to stat the entry being identified
    #[error("Failed to stat '{path}': {source}")]
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Catalog path error
    #[error("Invalid catalog path '{path}': {reason}")]
    InvalidCatalogPath { path: PathBuf, reason: String },

    /// Config file could not be read or parsed
    #[error("Invalid config file '{path}': {reason}")]
    InvalidConfigFile { path: PathBuf, reason: String },

    /// No roots given for a scan
    #[error("At least one directory is required for scan")]
    NoRoots,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked outside the task boundary
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// All workers died while work was still pending
    #[error("All workers have terminated unexpectedly ({pending} task(s) pending)")]
    AllWorkersDead { pending: usize },
}

/// Result type alias for CrawlError
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for CatalogError
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Result type alias for IdentifyError
pub type IdentifyResult<T> = std::result::Result<T, IdentifyError>;

/// Represents the outcome of handling a single scan task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Directory enumerated; `children` tasks were pushed
    Expanded { path: String, children: usize },

    /// File matched a stored (size, mtime); nothing was done
    Unchanged { path: String },

    /// File identified and a new catalog entry written
    Cataloged {
        path: String,
        content_hash: String,
        new_metadata: bool,
    },

    /// Entry skipped (unknown kind, excluded, no access, vanished)
    Skipped { path: String, reason: String },

    /// Stored metadata for the hash disagrees with the fresh extraction
    Mismatch { path: String, content_hash: String },
}

impl TaskOutcome {
    /// Returns the path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            TaskOutcome::Expanded { path, .. } => path,
            TaskOutcome::Unchanged { path } => path,
            TaskOutcome::Cataloged { path, .. } => path,
            TaskOutcome::Skipped { path, .. } => path,
            TaskOutcome::Mismatch { path, .. } => path,
        }
    }

    /// Returns true if the catalog was written while producing this outcome
    pub fn wrote_catalog(&self) -> bool {
        matches!(self, TaskOutcome::Cataloged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err = CatalogError::UnknownTable("nope".into());
        let crawl_err: CrawlError = err.into();
        assert!(matches!(crawl_err, CrawlError::Catalog(_)));
    }

    #[test]
    fn test_outcome_path() {
        let outcome = TaskOutcome::Cataloged {
            path: "/data/a.txt".into(),
            content_hash: "abc".into(),
            new_metadata: true,
        };
        assert_eq!(outcome.path(), "/data/a.txt");
        assert!(outcome.wrote_catalog());

        let unchanged = TaskOutcome::Unchanged {
            path: "/data/a.txt".into(),
        };
        assert!(!unchanged.wrote_catalog());
    }

    #[test]
    fn test_all_workers_dead_message() {
        let err = WorkerError::AllWorkersDead { pending: 3 };
        assert!(err.to_string().contains("3 task(s) pending"));
    }
}
