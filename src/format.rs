//! Human-readable rendering of search and identify results
//!
//! Output groups rows by path:
//!
//! ```text
//! /photos/a.jpg
//!     2483120 (2.37 MiB) 2023 Jun 04 18:22 9f2c...e1 JPG 4000x3000
//! ```
//!
//! Each content hash's metadata is printed once, on the first row that
//! references it.

use crate::catalog::{CatalogEntry, Metadata};
use chrono::{Local, TimeZone};
use humansize::{format_size, BINARY};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write;

/// Timestamp layout for mtimes
const MTIME_FORMAT: &str = "%Y %b %d %H:%M";

/// One known state of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub size: u64,
    pub mtime_ns: i64,
    /// `None` when the hash was not computed
    pub content_hash: Option<String>,
}

/// Rows grouped by path plus the metadata they reference
#[derive(Debug, Default)]
pub struct Listing {
    files: BTreeMap<String, Vec<ListedFile>>,
    /// Metadata by content hash
    metadata: HashMap<String, Metadata>,
    /// Metadata of rows without a hash, by path
    unhashed: HashMap<String, Metadata>,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog entry
    pub fn add_entry(&mut self, entry: CatalogEntry) {
        self.files.entry(entry.path).or_default().push(ListedFile {
            size: entry.size,
            mtime_ns: entry.mtime_ns,
            content_hash: Some(entry.content_hash),
        });
    }

    /// Add a row with its metadata attached directly
    pub fn add_file(&mut self, path: &str, file: ListedFile, metadata: Metadata) {
        match &file.content_hash {
            Some(hash) => {
                self.metadata.entry(hash.clone()).or_insert(metadata);
            }
            None => {
                self.unhashed.insert(path.to_string(), metadata);
            }
        }
        self.files.entry(path.to_string()).or_default().push(file);
    }

    /// Attach metadata for a content hash
    pub fn set_metadata(&mut self, content_hash: &str, metadata: Metadata) {
        self.metadata.insert(content_hash.to_string(), metadata);
    }

    /// Distinct content hashes referenced by the rows, sorted
    pub fn content_hashes(&self) -> Vec<String> {
        let mut hashes: Vec<_> = self
            .files
            .values()
            .flatten()
            .filter_map(|f| f.content_hash.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        hashes.sort();
        hashes
    }

    pub fn metadata(&self, content_hash: &str) -> Option<&Metadata> {
        self.metadata.get(content_hash)
    }

    /// Number of distinct paths
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Render every path and row. With `full`, metadata is printed as
    /// indented JSON; otherwise only the format and dimensions.
    pub fn render(&self, full: bool) -> String {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = String::new();

        for (path, rows) in &self.files {
            out.push_str(path);
            out.push('\n');

            for row in rows {
                let _ = write!(
                    out,
                    "    {} ({}) {}",
                    row.size,
                    format_size(row.size, BINARY),
                    format_mtime(row.mtime_ns)
                );

                let metadata = match &row.content_hash {
                    Some(hash) => {
                        out.push(' ');
                        out.push_str(hash);
                        if seen.insert(hash.as_str()) {
                            self.metadata.get(hash)
                        } else {
                            None
                        }
                    }
                    None => self.unhashed.get(path),
                };

                match metadata {
                    Some(metadata) if full => {
                        out.push('\n');
                        out.push_str(&indent(&pretty_json(metadata), 8));
                    }
                    Some(metadata) => out.push_str(&summary(metadata)),
                    None => {}
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Local modification time, e.g. `2023 Jun 04 18:22`
pub fn format_mtime(mtime_ns: i64) -> String {
    Local.timestamp_nanos(mtime_ns).format(MTIME_FORMAT).to_string()
}

/// ` FORMAT WxH`, whichever parts are present
fn summary(metadata: &Metadata) -> String {
    let mut out = String::new();
    if let Some(format) = metadata.get("format") {
        out.push(' ');
        out.push_str(&plain(format));
    }
    if let (Some(width), Some(height)) = (metadata.get("width"), metadata.get("height")) {
        let _ = write!(out, " {}x{}", plain(width), plain(height));
    }
    out
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON with four-space indentation
fn pretty_json(metadata: &Metadata) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if metadata.serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_metadata() -> Metadata {
        let mut m = Metadata::new();
        m.insert("format".into(), json!("PNG"));
        m.insert("width".into(), json!(640));
        m.insert("height".into(), json!(480));
        m
    }

    fn entry(path: &str, hash: &str) -> CatalogEntry {
        CatalogEntry {
            path: path.into(),
            source: "s".into(),
            size: 2048,
            mtime_ns: 0,
            content_hash: hash.into(),
        }
    }

    #[test]
    fn test_summary_line() {
        let mut listing = Listing::new();
        listing.add_entry(entry("/p/a.png", "h1"));
        listing.set_metadata("h1", image_metadata());

        let out = listing.render(false);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "/p/a.png");
        assert!(lines[1].starts_with("    2048 ("));
        assert!(lines[1].contains("KiB) "));
        assert!(lines[1].ends_with(" h1 PNG 640x480"));
    }

    #[test]
    fn test_metadata_printed_once_per_hash() {
        let mut listing = Listing::new();
        listing.add_entry(entry("/p/a.png", "h1"));
        listing.add_entry(entry("/p/b.png", "h1"));
        listing.set_metadata("h1", image_metadata());

        let out = listing.render(false);
        assert_eq!(out.matches("640x480").count(), 1);
        assert_eq!(listing.content_hashes(), vec!["h1".to_string()]);
        assert_eq!(listing.len(), 2);
    }

    #[test]
    fn test_full_json() {
        let mut listing = Listing::new();
        listing.add_file(
            "x.png",
            ListedFile {
                size: 1,
                mtime_ns: 0,
                content_hash: None,
            },
            image_metadata(),
        );

        let out = listing.render(true);
        assert!(out.contains("        {\n"));
        assert!(out.contains("            \"format\": \"PNG\""));
        assert!(!out.contains("640x480"));
    }

    #[test]
    fn test_format_mtime_layout() {
        let formatted = format_mtime(1_700_000_000_000_000_000);
        // "YYYY Mon DD HH:MM"
        assert_eq!(formatted.len(), 17);
        assert!(formatted.starts_with("2023 Nov"));
    }
}
