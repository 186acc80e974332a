//! SHA-256 content fingerprints.
//!
//! Digests are lowercase hex strings (64 characters). The buffer and stream
//! forms produce identical output for identical content, so a file hashed on
//! disk during a scan can be compared directly with downloaded bytes.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Length of a hex-encoded SHA-256 digest
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Read buffer used when hashing streams
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the checksum of an in-memory buffer.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Compute the checksum of everything readable from `reader`.
///
/// Reads in fixed-size chunks, so arbitrarily large inputs are never held in
/// memory at once.
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the checksum of a file on disk.
pub fn checksum_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    checksum_reader(file)
}

/// Normalize a digest for comparison (trimmed, lowercase).
pub fn normalize(checksum: &str) -> String {
    checksum.trim().to_ascii_lowercase()
}

/// True if `checksum` looks like a hex SHA-256 digest (any case).
pub fn is_valid(checksum: &str) -> bool {
    let checksum = checksum.trim();
    checksum.len() == CHECKSUM_HEX_LEN && checksum.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Case-insensitive digest comparison.
pub fn matches(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_known_value() {
        assert_eq!(
            checksum_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_deterministic_and_distinct() {
        assert_eq!(checksum_bytes(b"same"), checksum_bytes(b"same"));
        assert_ne!(checksum_bytes(b"aaa"), checksum_bytes(b"aab"));
    }

    #[test]
    fn test_file_matches_buffer() -> io::Result<()> {
        // Larger than one read buffer to exercise chunking
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(&data)?;
        temp_file.flush()?;

        assert_eq!(checksum_file(temp_file.path())?, checksum_bytes(&data));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = checksum_file(Path::new("/definitely/not/here.bin"));
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_and_matches() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        assert!(is_valid(upper));
        assert!(matches(upper, &checksum_bytes(b"hello world")));
        assert_eq!(normalize(upper), checksum_bytes(b"hello world"));
    }

    #[test]
    fn test_is_valid_rejects_bad_input() {
        assert!(!is_valid(""));
        assert!(!is_valid("abc"));
        assert!(!is_valid(&"g".repeat(64)));
    }
}
