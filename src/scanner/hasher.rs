//! Streaming content fingerprints.
//!
//! # Overview
//!
//! The [`Hasher`] turns a file's full byte content into a [`Fingerprint`].
//! Files are read in fixed [`CHUNK_SIZE`] pieces so memory use stays constant
//! regardless of file size. The digest algorithm is chosen per run through
//! [`HashAlgorithm`]; callers only ever see `fingerprint(path)`.
//!
//! # Example
//!
//! ```no_run
//! use dupesweep::scanner::{HashAlgorithm, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new(HashAlgorithm::Blake3);
//! let fp = hasher.fingerprint(Path::new("photo.jpg")).unwrap();
//! println!("{fp}");
//! ```

use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::HashError;

/// Size of each read while streaming a file through the digest.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Digest algorithm used to fingerprint file content.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3, 32-byte digest.
    #[default]
    Blake3,
    /// SHA-256, 32-byte digest.
    Sha256,
    /// MD5, 16-byte digest. Adequate for deduplication, not for security.
    Md5,
}

impl HashAlgorithm {
    /// Digest length in bytes.
    #[must_use]
    pub fn digest_len(self) -> usize {
        match self {
            Self::Blake3 | Self::Sha256 => 32,
            Self::Md5 => 16,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Md5 => write!(f, "md5"),
        }
    }
}

/// Fixed-length digest of a file's full byte content.
///
/// Two fingerprints are equal only when both the algorithm and the digest
/// bytes match.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    algorithm: HashAlgorithm,
    digest: Box<[u8]>,
}

impl Fingerprint {
    /// Wrap raw digest bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, digest: impl Into<Box<[u8]>>) -> Self {
        Self {
            algorithm,
            digest: digest.into(),
        }
    }

    /// Parse a lowercase or uppercase hex digest.
    ///
    /// Returns `None` when the string is not valid hex or its length does not
    /// match the algorithm's digest length.
    #[must_use]
    pub fn from_hex(algorithm: HashAlgorithm, hex: &str) -> Option<Self> {
        if hex.len() != algorithm.digest_len() * 2 || !hex.is_ascii() {
            return None;
        }
        let digest = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
            .collect::<Option<Vec<u8>>>()?;
        Some(Self::new(algorithm, digest))
    }

    /// Algorithm that produced this fingerprint.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.digest
    }

    /// Lowercase hex rendering of the digest.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.digest.len() * 2);
        for byte in self.digest.iter() {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}:{})", self.algorithm, self.to_hex())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

enum DigestState {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
    Md5(Md5),
}

impl DigestState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Sha256(h) => Digest::update(h, data),
            Self::Md5(h) => Digest::update(h, data),
        }
    }

    fn finalize(self) -> Box<[u8]> {
        match self {
            Self::Blake3(h) => Box::from(h.finalize().as_bytes().as_slice()),
            Self::Sha256(h) => h.finalize().to_vec().into_boxed_slice(),
            Self::Md5(h) => h.finalize().to_vec().into_boxed_slice(),
        }
    }
}

/// Streaming file fingerprinter.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a hasher for the given algorithm.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            cancel_flag: None,
        }
    }

    /// Abort long reads when the flag is raised.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Algorithm in use.
    #[must_use]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Fingerprint the full content of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened, a read fails
    /// mid-stream, or cancellation is observed between chunks.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint, HashError> {
        let file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        match self.fingerprint_reader(file) {
            Ok(Some(fp)) => Ok(fp),
            Ok(None) => Err(HashError::Interrupted(path.to_path_buf())),
            Err(e) => Err(HashError::from_io(path, e)),
        }
    }

    /// Fingerprint everything readable from `reader`.
    ///
    /// Returns `Ok(None)` if cancellation was requested before the stream
    /// was exhausted.
    ///
    /// # Errors
    ///
    /// Propagates read errors other than [`io::ErrorKind::Interrupted`].
    pub fn fingerprint_reader<R: Read>(&self, mut reader: R) -> io::Result<Option<Fingerprint>> {
        let mut state = DigestState::new(self.algorithm);
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            if self.is_cancelled() {
                return Ok(None);
            }
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            state.update(&buffer[..n]);
        }

        Ok(Some(Fingerprint::new(self.algorithm, state.finalize())))
    }

    /// Fingerprint an in-memory buffer.
    #[must_use]
    pub fn fingerprint_bytes(&self, data: &[u8]) -> Fingerprint {
        let mut state = DigestState::new(self.algorithm);
        state.update(data);
        Fingerprint::new(self.algorithm, state.finalize())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_identical_content_same_fingerprint() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("nested_b.dat");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        let hasher = Hasher::default();
        assert_eq!(hasher.fingerprint(&a).unwrap(), hasher.fingerprint(&b).unwrap());
    }

    #[test]
    fn test_one_byte_difference_changes_fingerprint() {
        let hasher = Hasher::new(HashAlgorithm::Md5);
        assert_ne!(
            hasher.fingerprint_bytes(b"abcdef"),
            hasher.fingerprint_bytes(b"abcdeg")
        );
    }

    #[test]
    fn test_streaming_matches_in_memory_across_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("large.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256, HashAlgorithm::Md5] {
            let hasher = Hasher::new(algorithm);
            assert_eq!(
                hasher.fingerprint(&path).unwrap(),
                hasher.fingerprint_bytes(&data)
            );
        }
    }

    #[test]
    fn test_known_md5_digest() {
        let hasher = Hasher::new(HashAlgorithm::Md5);
        assert_eq!(
            hasher.fingerprint_bytes(b"").to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_digest_lengths() {
        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256, HashAlgorithm::Md5] {
            let fp = Hasher::new(algorithm).fingerprint_bytes(b"x");
            assert_eq!(fp.as_bytes().len(), algorithm.digest_len());
            assert_eq!(fp.to_hex().len(), algorithm.digest_len() * 2);
        }
    }

    #[test]
    fn test_algorithms_never_compare_equal() {
        let sha = Fingerprint::new(HashAlgorithm::Sha256, vec![0u8; 32]);
        let blake = Fingerprint::new(HashAlgorithm::Blake3, vec![0u8; 32]);
        assert_ne!(sha, blake);
    }

    #[test]
    fn test_hex_round_trip() {
        let fp = Hasher::default().fingerprint_bytes(b"round trip");
        let parsed = Fingerprint::from_hex(HashAlgorithm::Blake3, &fp.to_hex()).unwrap();
        assert_eq!(parsed, fp);
        assert!(Fingerprint::from_hex(HashAlgorithm::Md5, &fp.to_hex()).is_none());
        assert!(Fingerprint::from_hex(HashAlgorithm::Md5, "zz").is_none());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let hasher = Hasher::default();
        let err = hasher.fingerprint(Path::new("/nonexistent/file/12345")).unwrap_err();
        assert!(matches!(err, HashError::NotFound(_)));
    }

    #[test]
    fn test_cancelled_hash_is_interrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        fs::write(&path, b"content").unwrap();

        let flag = Arc::new(AtomicBool::new(true));
        let hasher = Hasher::default().with_cancel_flag(flag);
        assert!(matches!(
            hasher.fingerprint(&path),
            Err(HashError::Interrupted(_))
        ));
    }
}
