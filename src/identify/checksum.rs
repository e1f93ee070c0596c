//! Content hashing using blake3
//!
//! The content hash is the catalog's deduplication key, so it must be
//! deterministic across runs and machines. Files are hashed in fixed-size
//! blocks to keep memory flat for very large files.

use crate::error::{IdentifyError, IdentifyResult};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Read block size for streaming hashes (1 MiB)
pub const BLOCK_SIZE: usize = 1 << 20;

/// Compute the content hash of an in-memory buffer
///
/// Returns a 64 character lowercase hex string (256-bit hash).
///
/// # Example
///
/// ```
/// use fscatalog::identify::checksum::hash_bytes;
///
/// let hash = hash_bytes(b"Hello, World!");
/// assert_eq!(hash.len(), 64);
/// ```
pub fn hash_bytes(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

/// Compute the content hash of a file, streaming it in blocks
pub fn hash_file(path: &Path) -> IdentifyResult<String> {
    let mut file = File::open(path).map_err(|source| IdentifyError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let read = file.read(&mut buffer).map_err(|source| IdentifyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_hash_bytes() {
        let hash = hash_bytes(b"Hello, World!");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_bytes(b"Hello, World!"));
        assert_ne!(hash, hash_bytes(b"Hello, World?"));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // Larger than one block so the streaming path is exercised
        let data = vec![0xABu8; BLOCK_SIZE + 17];
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        assert_eq!(hash_file(file.path()).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn test_hash_missing_file() {
        let err = hash_file(Path::new("/nonexistent/definitely/missing")).unwrap_err();
        assert!(matches!(err, IdentifyError::Read { .. }));
    }
}
