//! SHA-256 content hashing.
//!
//! Cache files can be hundreds of megabytes, so hashing always streams the
//! file in fixed-size chunks instead of reading it into memory.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer size used while hashing.
pub const HASH_CHUNK_SIZE: usize = 8 * 1024;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Compute the lowercase hex SHA-256 digest of a file.
///
/// The caller is responsible for checking that the path exists and is a
/// valid cache path; a missing or unreadable file is an I/O error.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(finalize_hex(hasher))
}

/// Hex digest of an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finalize_hex(hasher)
}

/// Consume a hasher and return its lowercase hex digest.
pub fn finalize_hex(hasher: Sha256) -> String {
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_hash_empty_file() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("empty");
        fs::write(&path, b"")?;

        assert_eq!(hash_file(&path)?, EMPTY_SHA256);
        Ok(())
    }

    #[test]
    fn test_hash_known_content() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("hello");
        fs::write(&path, b"hello")?;

        let digest = hash_file(&path)?;
        assert_eq!(digest, HELLO_SHA256);
        assert_eq!(digest.len(), SHA256_HEX_LEN);
        Ok(())
    }

    #[test]
    fn test_hash_spans_multiple_chunks() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("large");
        let data: Vec<u8> = (0..HASH_CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data)?;

        assert_eq!(hash_file(&path)?, hash_bytes(&data));
        Ok(())
    }

    #[test]
    fn test_hash_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = hash_file(&temp_dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
