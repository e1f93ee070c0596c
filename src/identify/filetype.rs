//! File type detection using magic bytes
//!
//! Uses the `infer` crate to detect file types from their header bytes, so
//! renamed files or files without extensions are still recognized. Images
//! additionally get their pixel dimensions from a header-only decode.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes read from the start of a file for type detection
pub const HEADER_SIZE: usize = 8192;

/// What the header bytes say about a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileType {
    /// Recognized by magic bytes
    Known {
        /// MIME type, e.g. `image/png`
        mime: String,
        /// Short format name, e.g. `PNG`
        format: String,
    },
    /// No magic match, but the header looks like UTF-8 text
    Text,
    /// No magic match, binary content
    Data,
}

impl FileType {
    pub fn is_image(&self) -> bool {
        matches!(self, FileType::Known { mime, .. } if mime.starts_with("image/"))
    }
}

/// Detect the type of a file from its header bytes
///
/// # Example
///
/// ```
/// use fscatalog::identify::filetype::{detect_file_type, FileType};
///
/// let png_header = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
/// assert!(detect_file_type(png_header).is_image());
/// assert_eq!(detect_file_type(b"plain words"), FileType::Text);
/// ```
pub fn detect_file_type(header: &[u8]) -> FileType {
    if let Some(kind) = infer::get(header) {
        return FileType::Known {
            mime: kind.mime_type().to_string(),
            format: kind.extension().to_uppercase(),
        };
    }

    if !header.is_empty() && !header.contains(&0) && std::str::from_utf8(header).is_ok() {
        FileType::Text
    } else {
        FileType::Data
    }
}

/// Read up to [`HEADER_SIZE`] bytes from the start of a file
pub fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut header = Vec::with_capacity(HEADER_SIZE);
    file.take(HEADER_SIZE as u64).read_to_end(&mut header)?;
    Ok(header)
}

/// Pixel dimensions of an image file, if it can be decoded
pub fn image_dimensions(path: &Path) -> Option<(u32, u32)> {
    image::ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
