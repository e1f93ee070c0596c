//! Container, codec and track fields via `mediainfo`
//!
//! When `mediainfo` is on `PATH` it is run with JSON output and selected
//! fields of the General, Video, Audio, Image and Text tracks are copied
//! into the metadata record. Like `exiftool`, a missing tool or unusable
//! output contributes no fields.

use super::{add_field, Merge};
use crate::catalog::Metadata;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// (track type, mediainfo field, metadata key, merge mode)
const FIELDS: &[(&str, &str, &str, Merge)] = &[
    ("General", "Encoded_Date", "encoded_date", Merge::Keep),
    ("General", "Tagged_Date", "tagged_date", Merge::Keep),
    ("General", "Format", "format", Merge::Keep),
    ("General", "Rating", "rating", Merge::Keep),
    ("General", "Duration", "duration", Merge::Keep),
    ("General", "Performer", "performer", Merge::Keep),
    ("General", "Album", "album", Merge::Keep),
    ("General", "Track", "track", Merge::Keep),
    ("Video", "CodecID", "video_codec", Merge::Keep),
    ("Video", "Format_Commercial_IfAny", "video_codec", Merge::Keep),
    ("Video", "Width", "width", Merge::Keep),
    ("Video", "Height", "height", Merge::Keep),
    ("Audio", "CodecID", "audio_codec", Merge::Keep),
    ("Audio", "Format_Commercial_IfAny", "audio_codec", Merge::Keep),
    ("Audio", "BitRate_Mode", "audio_mode", Merge::Keep),
    ("Audio", "BitRate", "audio_rate", Merge::Keep),
    ("Image", "Width", "width", Merge::Keep),
    ("Image", "Height", "height", Merge::Keep),
    ("Text", "Language", "language", Merge::Append),
];

/// Keys stored as integers; mediainfo reports every value as a string
const INTEGER_KEYS: &[&str] = &["width", "height", "audio_rate"];

/// Locate `mediainfo` on `PATH`
pub fn find_mediainfo() -> Option<PathBuf> {
    which::which("mediainfo").ok()
}

/// Run mediainfo on `path` and merge the known track fields into `metadata`
pub fn extract(mediainfo: &Path, path: &Path, metadata: &mut Metadata) {
    let output = match Command::new(mediainfo)
        .arg("--Output=JSON")
        .arg(path)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "mediainfo failed to run");
            return;
        }
    };

    if !output.status.success() {
        return;
    }

    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(report) => {
            if let Some(tracks) = report.pointer("/media/track").and_then(Value::as_array) {
                merge_tracks(tracks, metadata);
            }
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "mediainfo output not parsable");
        }
    }
}

/// Copy the known fields of each track, in track order
pub fn merge_tracks(tracks: &[Value], metadata: &mut Metadata) {
    for track in tracks {
        let Some(fields) = track.as_object() else {
            continue;
        };
        let Some(kind) = fields.get("@type").and_then(Value::as_str) else {
            continue;
        };

        for (track_type, field, key, merge) in FIELDS {
            if *track_type != kind {
                continue;
            }
            if let Some(value) = fields.get(*field) {
                add_field(metadata, key, normalize(key, value), *merge);
            }
        }
    }
}

fn normalize(key: &str, value: &Value) -> Value {
    match value {
        Value::String(s) if INTEGER_KEYS.contains(&key) => s
            .trim()
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}
