//! File hashing.

use crate::core::AppboxError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// SHA-512
    Sha512,
}

impl HashAlgorithm {
    /// Length of the hex encoding of a digest.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Guess the algorithm from the length of a hex digest.
    #[must_use]
    pub fn from_hex_len(hex: &str) -> Option<Self> {
        match hex.trim().len() {
            64 => Some(Self::Sha256),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        })
    }
}

impl FromStr for HashAlgorithm {
    type Err = AppboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(AppboxError::Verification {
                reason: format!("unsupported hash algorithm '{other}'"),
            }),
        }
    }
}

/// Validate an expected hex digest and normalize it to lowercase.
///
/// # Errors
///
/// Returns [`AppboxError::Verification`] if `expected` is not hex of the algorithm's length.
pub fn normalize_hex(expected: &str, algorithm: HashAlgorithm) -> Result<String, AppboxError> {
    let expected = expected.trim().to_ascii_lowercase();
    if expected.len() != algorithm.hex_len() || !expected.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppboxError::Verification {
            reason: format!("malformed {algorithm} hash '{expected}'"),
        });
    }
    Ok(expected)
}

/// Hash a file, returning lowercase hex. Blocking.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn hash_file_blocking(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    match algorithm {
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(&mut file, path),
        HashAlgorithm::Sha512 => digest_reader::<Sha512>(&mut file, path),
    }
}

fn digest_reader<D: Digest>(reader: &mut impl Read, path: &Path) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("Failed to read {} for hashing", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file on the blocking pool.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    debug!("Computing {algorithm} for {}", path.display());
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path, algorithm))
        .await
        .context("Hashing task panicked")?
}

/// SHA-256 of a file on the blocking pool.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String> {
    hash_file(path, HashAlgorithm::Sha256).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[tokio::test]
    async fn test_sha256_known_value() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        assert_eq!(sha256_file(file.path()).await.unwrap(), HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_sha512_length() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let hex = hash_file(file.path(), HashAlgorithm::Sha512).await.unwrap();
        assert_eq!(hex.len(), 128);
        assert!(hex.starts_with("309ecc489c12d6eb4cc40f50c902f2b4"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let result = sha256_file(Path::new("/nonexistent/appbox/file")).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_normalize_hex() {
        let upper = HELLO_SHA256.to_ascii_uppercase();
        assert_eq!(normalize_hex(&upper, HashAlgorithm::Sha256).unwrap(), HELLO_SHA256);
        assert!(normalize_hex("abc", HashAlgorithm::Sha256).is_err());
        assert!(normalize_hex(&"z".repeat(64), HashAlgorithm::Sha256).is_err());
        assert!(normalize_hex(HELLO_SHA256, HashAlgorithm::Sha512).is_err());
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha-512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::from_hex_len(HELLO_SHA256), Some(HashAlgorithm::Sha256));
    }
}
