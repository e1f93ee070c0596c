//! Content identification
//!
//! Given a path, an [`Identifier`] returns the content hash, a metadata
//! record and the kind of entry. Identification is the expensive step of a
//! crawl (it reads the whole file), so the crawler only calls it for files
//! whose size or mtime changed.
//!
//! The default [`FileIdentifier`] combines:
//! - a streaming blake3 hash (`checksum`)
//! - container, codec and track fields from `mediainfo`, when installed
//!   (`mediainfo`)
//! - magic-byte type detection and image dimensions (`filetype`)
//! - EXIF/document fields from `exiftool`, when installed (`exif`)
//!
//! Extractor failures degrade to partial metadata; only failing to read the
//! file itself is an error.

pub mod checksum;
pub mod exif;
pub mod filetype;
pub mod mediainfo;

use crate::catalog::Metadata;
use crate::error::{IdentifyError, IdentifyResult};
use filetype::FileType;
use serde_json::{json, Value};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Kind of filesystem entry, as seen by the identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Link,
    /// Sockets, FIFOs, devices and anything else without content
    Unknown,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Link => "link",
            EntryKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of identifying one path
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub kind: EntryKind,

    /// Content hash; `None` for entries without content or when hashing
    /// was disabled
    pub content_hash: Option<String>,

    pub metadata: Metadata,
}

/// Something that can identify file content. Each worker owns its own
/// identifier (cloned from a prototype).
pub trait Identifier: Send + 'static {
    fn identify(&mut self, path: &Path) -> IdentifyResult<Identification>;
}

/// Default identifier for local files
#[derive(Debug, Clone)]
pub struct FileIdentifier {
    /// Compute the content hash (always on for crawls)
    checksum: bool,

    /// `exiftool` binary, if available
    exiftool: Option<PathBuf>,

    /// `mediainfo` binary, if available
    mediainfo: Option<PathBuf>,
}

impl FileIdentifier {
    /// Identifier with hashing enabled and `mediainfo`/`exiftool` looked
    /// up on `PATH`
    pub fn new() -> Self {
        Self {
            checksum: true,
            exiftool: exif::find_exiftool(),
            mediainfo: mediainfo::find_mediainfo(),
        }
    }

    /// Enable or disable content hashing
    pub fn checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    /// Disable `mediainfo` and `exiftool` extraction (deterministic output
    /// in tests)
    pub fn without_external_tools(mut self) -> Self {
        self.exiftool = None;
        self.mediainfo = None;
        self
    }

    pub fn has_exiftool(&self) -> bool {
        self.exiftool.is_some()
    }

    pub fn has_mediainfo(&self) -> bool {
        self.mediainfo.is_some()
    }

    /// Classify `path` the way the catalog needs it: regular files (through
    /// links) are files, directories are directories, dangling links are
    /// links, everything else is unknown.
    pub fn classify(path: &Path) -> IdentifyResult<EntryKind> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(EntryKind::File),
            Ok(meta) if meta.is_dir() => Ok(EntryKind::Directory),
            Ok(_) => Ok(EntryKind::Unknown),
            Err(e) if e.kind() == ErrorKind::NotFound => match std::fs::symlink_metadata(path) {
                Ok(meta) if meta.file_type().is_symlink() => Ok(EntryKind::Link),
                _ => Err(IdentifyError::Stat {
                    path: path.to_path_buf(),
                    source: e,
                }),
            },
            Err(source) => Err(IdentifyError::Stat {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn file_metadata(&self, path: &Path) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), json!(EntryKind::File.as_str()));

        if let Some(mediainfo) = &self.mediainfo {
            mediainfo::extract(mediainfo, path, &mut metadata);
        }

        // Unreadable headers only cost the type fields
        let file_type = filetype::read_header(path)
            .map(|header| filetype::detect_file_type(&header))
            .unwrap_or(FileType::Data);

        match &file_type {
            FileType::Known { mime, format } => {
                metadata.entry("mime").or_insert_with(|| json!(mime));
                metadata.entry("format").or_insert_with(|| json!(format));
            }
            // A container format from mediainfo makes the magic text moot
            FileType::Text if !metadata.contains_key("format") => {
                metadata.insert("magic".into(), json!("text"));
            }
            FileType::Data if !metadata.contains_key("format") => {
                metadata.insert("magic".into(), json!("data"));
            }
            _ => {}
        }

        if file_type.is_image() {
            if let Some((width, height)) = filetype::image_dimensions(path) {
                add_field(&mut metadata, "width", json!(width), Merge::Keep);
                add_field(&mut metadata, "height", json!(height), Merge::Keep);
            }
        }

        if let Some(exiftool) = &self.exiftool {
            exif::extract(exiftool, path, &mut metadata);
        }

        metadata
    }
}

/// Strings longer than this are cut at their first ` /` separator
const LONG_VALUE: usize = 20;

/// How an extracted field combines with a value already in the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// First value wins
    Keep,
    /// Later value wins
    Force,
    /// Comma-joined with the existing value
    Append,
}

/// Add an extracted field to `metadata`. Null values are ignored and long
/// strings lose their ` /...` tail.
pub fn add_field(metadata: &mut Metadata, key: &str, value: Value, merge: Merge) {
    if value.is_null() {
        return;
    }

    let value = match value {
        Value::String(s) if s.len() > LONG_VALUE => match s.find(" /") {
            Some(idx) => Value::String(s[..idx].to_string()),
            None => Value::String(s),
        },
        other => other,
    };

    match metadata.get_mut(key) {
        None => {
            metadata.insert(key.to_string(), value);
        }
        Some(existing) => match merge {
            Merge::Keep => {}
            Merge::Force => *existing = value,
            Merge::Append => {
                *existing = Value::String(format!("{},{}", as_text(existing), as_text(&value)));
            }
        },
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Default for FileIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Identifier for FileIdentifier {
    fn identify(&mut self, path: &Path) -> IdentifyResult<Identification> {
        let kind = Self::classify(path)?;

        if kind != EntryKind::File {
            let mut metadata = Metadata::new();
            metadata.insert("type".into(), json!(kind.as_str()));
            return Ok(Identification {
                kind,
                content_hash: None,
                metadata,
            });
        }

        let metadata = self.file_metadata(path);
        let content_hash = if self.checksum {
            Some(checksum::hash_file(path)?)
        } else {
            None
        };

        Ok(Identification {
            kind,
            content_hash,
            metadata,
        })
    }
}
