//! EXIF and document fields via `exiftool`
//!
//! When `exiftool` is on `PATH`, it is run with JSON output and a fixed set
//! of fields is copied into the metadata record. Any failure (tool missing,
//! non-zero exit, unparsable output) yields no fields; it never fails the
//! identification.

use super::{add_field, Merge};
use crate::catalog::Metadata;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// (exiftool tag, metadata key, merge mode)
const FIELDS: &[(&str, &str, Merge)] = &[
    // Documents
    ("PDFVersion", "pdf_version", Merge::Keep),
    ("PageCount", "pages", Merge::Keep),
    ("Title", "title", Merge::Keep),
    ("Author", "author", Merge::Keep),
    ("CreateDate", "create_date", Merge::Keep),
    ("ISBN", "isbn", Merge::Keep),
    // Images
    ("ImageWidth", "width", Merge::Force),
    ("ImageHeight", "height", Merge::Force),
    ("Model", "camera", Merge::Keep),
    ("LensModel", "lens", Merge::Keep),
    ("ShutterSpeed", "shutter", Merge::Keep),
    ("Aperture", "aperture", Merge::Keep),
    ("FocalLength", "focal_length", Merge::Keep),
    ("GPSDateTime", "gps_date", Merge::Keep),
    ("GPSLongitude", "gps_lon", Merge::Keep),
    ("GPSLatitude", "gps_lat", Merge::Keep),
];

/// Locate `exiftool` on `PATH`
pub fn find_exiftool() -> Option<PathBuf> {
    which::which("exiftool").ok()
}

/// Run exiftool on `path` and merge the known fields into `metadata`
pub fn extract(exiftool: &Path, path: &Path, metadata: &mut Metadata) {
    let output = match Command::new(exiftool)
        .args(["-c", "%f", "-j"])
        .arg(path)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "exiftool failed to run");
            return;
        }
    };

    if !output.status.success() {
        return;
    }

    match serde_json::from_slice::<Vec<Value>>(&output.stdout) {
        Ok(records) => {
            if let Some(Value::Object(tags)) = records.into_iter().next() {
                merge_tags(&tags, metadata);
            }
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "exiftool output not parsable");
        }
    }
}

/// Copy the known exiftool tags into `metadata`
pub fn merge_tags(tags: &serde_json::Map<String, Value>, metadata: &mut Metadata) {
    for (tag, key, merge) in FIELDS {
        if let Some(value) = tags.get(*tag) {
            add_field(metadata, key, value.clone(), *merge);
        }
    }
}
