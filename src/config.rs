//! Configuration types for fscatalog
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Layered TOML config files
//! - Validated runtime configuration for scans

use crate::error::ConfigError;
use clap::{Parser, Subcommand};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
pub const MAX_WORKERS: usize = 512;

/// File name of the catalog when none is configured
const DEFAULT_CATALOG_NAME: &str = "catalog.db";

/// Concurrent file-cataloging crawler
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fscatalog",
    version,
    about = "Catalog file content and metadata across directory trees",
    long_about = "Walks directory trees with a pool of worker threads, identifies each file's \
                  content (hash, type, dimensions, EXIF fields) and records it in a SQLite \
                  catalog. Repeated scans only re-identify files whose size or mtime changed.",
    after_help = "EXAMPLES:\n    \
        fscatalog init\n    \
        fscatalog scan ~/Pictures /mnt/archive -w 8\n    \
        fscatalog scan /data --source backup --exclude '\\.cache/'\n    \
        fscatalog search '\\.jpe?g$' --full\n    \
        fscatalog id photo.jpg --full"
)]
pub struct CliArgs {
    /// Catalog database file
    #[arg(short = 'c', long, global = true, env = "FSCATALOG_CATALOG", value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Read configuration from this file instead of the default locations
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Verbose output (log every crawl event)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan directory trees into the catalog
    Scan {
        /// Directories to scan
        #[arg(value_name = "DIR", required = true)]
        roots: Vec<PathBuf>,

        /// Number of worker threads
        #[arg(short = 'w', long, value_name = "NUM")]
        workers: Option<usize>,

        /// Source label for every root (default: each root's last component)
        #[arg(short = 's', long, value_name = "LABEL")]
        source: Option<String>,

        /// Exclude paths matching pattern (can be repeated)
        #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
        exclude: Vec<String>,

        /// Quiet mode - suppress progress output
        #[arg(short = 'q', long)]
        quiet: bool,

        /// Crawl into an in-memory catalog; nothing is written to disk
        #[arg(long)]
        dry_run: bool,
    },

    /// Create the catalog schema
    Init,

    /// Delete the catalog file
    Drop,

    /// Show catalog information
    Info,

    /// Print every row of a catalog table
    Dump {
        /// Table name (paths, meta, catalog_info)
        #[arg(value_name = "TABLE")]
        table: String,
    },

    /// Search cataloged paths with a regular expression
    Search {
        /// Regular expression matched against full paths
        #[arg(value_name = "REGEX")]
        pattern: String,

        /// Print the full metadata of each match
        #[arg(long)]
        full: bool,
    },

    /// Identify files without using the catalog
    Id {
        /// Files to identify
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Compute the content hash and print the full metadata
        #[arg(long)]
        full: bool,
    },

    /// Show the effective configuration
    Config,
}

/// Default worker count: I/O bound, so twice the CPU count
pub fn default_workers() -> usize {
    (num_cpus::get() * 2).clamp(1, MAX_WORKERS)
}

/// Default catalog location: `<data dir>/fscatalog/catalog.db`
pub fn default_catalog_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "fscatalog")
        .map(|dirs| dirs.data_dir().join(DEFAULT_CATALOG_NAME))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_NAME))
}

/// Config file locations in load order; later files override earlier ones
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/fscatalog.toml")];
    if let Some(dirs) = directories::BaseDirs::new() {
        paths.push(dirs.config_dir().join("fscatalog").join("config.toml"));
        paths.push(dirs.home_dir().join(".fscatalog.toml"));
    }
    paths
}

/// Contents of one TOML config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub catalog: Option<PathBuf>,
    pub workers: Option<usize>,
    pub source: Option<String>,
    pub exclude: Vec<String>,
}

impl FileConfig {
    /// Parse a single config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::InvalidConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overlay `other` on top of `self`
    pub fn merge(mut self, other: FileConfig) -> Self {
        if other.catalog.is_some() {
            self.catalog = other.catalog;
        }
        if other.workers.is_some() {
            self.workers = other.workers;
        }
        if other.source.is_some() {
            self.source = other.source;
        }
        self.exclude.extend(other.exclude);
        self
    }
}

/// Effective settings after merging config files and CLI flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub catalog: PathBuf,
    pub workers: usize,
    pub source: Option<String>,
    pub exclude: Vec<String>,

    /// Config files that were read, in order
    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

impl Settings {
    /// Load config files and apply the global CLI flags.
    ///
    /// An explicit `--config` file must exist; default locations are
    /// optional.
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let (file, loaded_from) = match &args.config_file {
            Some(path) => (FileConfig::load(path)?, vec![path.clone()]),
            None => {
                let mut merged = FileConfig::default();
                let mut loaded = Vec::new();
                for path in default_config_paths() {
                    if path.is_file() {
                        merged = merged.merge(FileConfig::load(&path)?);
                        loaded.push(path);
                    }
                }
                (merged, loaded)
            }
        };

        let mut settings = Self::from_file(file);
        settings.loaded_from = loaded_from;
        if let Some(catalog) = &args.catalog {
            settings.catalog = catalog.clone();
        }
        Ok(settings)
    }

    /// Settings from a config file alone, with defaults filled in
    pub fn from_file(file: FileConfig) -> Self {
        Self {
            catalog: file.catalog.unwrap_or_else(default_catalog_path),
            workers: file.workers.unwrap_or_else(default_workers),
            source: file.source,
            exclude: file.exclude,
            loaded_from: Vec::new(),
        }
    }

    /// Render as TOML (for the `config` subcommand)
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Validated runtime configuration for a scan
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Directory trees to crawl
    pub roots: Vec<PathBuf>,

    /// Catalog database path
    pub catalog_path: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Source label override; `None` uses each root's last component
    pub source: Option<String>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Log every crawl event
    pub verbose: bool,

    /// Crawl into an in-memory catalog
    pub dry_run: bool,
}

impl ScanConfig {
    /// Minimal configuration for library use: defaults everywhere
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            catalog_path: default_catalog_path(),
            worker_count: default_workers(),
            source: None,
            exclude_patterns: Vec::new(),
            show_progress: false,
            verbose: false,
            dry_run: false,
        }
    }

    /// Set the worker count
    pub fn workers(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the source label override
    pub fn source(mut self, label: impl Into<String>) -> Self {
        self.source = Some(label.into());
        self
    }

    /// Add an exclude pattern
    pub fn exclude(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.exclude_patterns.push(compile_pattern(pattern)?);
        Ok(self)
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs, settings: &Settings) -> Result<Self, ConfigError> {
        let Command::Scan {
            roots,
            workers,
            source,
            exclude,
            quiet,
            dry_run,
        } = &args.command
        else {
            return Err(ConfigError::NoRoots);
        };

        if roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }

        let worker_count = workers.unwrap_or(settings.workers);
        validate_workers(worker_count)?;

        // Config file patterns first, then CLI patterns
        let exclude_patterns = settings
            .exclude
            .iter()
            .chain(exclude.iter())
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        let catalog_path = settings.catalog.clone();
        if !dry_run {
            validate_catalog_path(&catalog_path)?;
        }

        Ok(Self {
            roots: roots.clone(),
            catalog_path,
            worker_count,
            source: source.clone().or_else(|| settings.source.clone()),
            exclude_patterns,
            show_progress: !quiet,
            verbose: args.verbose,
            dry_run: *dry_run,
        })
    }

    /// Validate values set programmatically
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }
        validate_workers(self.worker_count)
    }

    /// Check if a path should be excluded
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_patterns.iter().any(|re| re.is_match(path))
    }
}

fn validate_workers(count: usize) -> Result<(), ConfigError> {
    if count == 0 || count > MAX_WORKERS {
        return Err(ConfigError::InvalidWorkerCount {
            count,
            max: MAX_WORKERS,
        });
    }
    Ok(())
}

fn validate_catalog_path(path: &Path) -> Result<(), ConfigError> {
    if path.is_dir() {
        return Err(ConfigError::InvalidCatalogPath {
            path: path.to_path_buf(),
            reason: "Path is a directory".to_string(),
        });
    }
    if let Some(parent) = path.parent() {
        if parent.is_file() {
            return Err(ConfigError::InvalidCatalogPath {
                path: path.to_path_buf(),
                reason: format!("Parent '{}' is a file", parent.display()),
            });
        }
    }
    Ok(())
}

fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidExcludePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
