//! Streaming SHA-256 digests of release artefacts.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// A lowercase, hex-encoded SHA-256 digest computed locally.
///
/// # Examples
///
/// ```
/// use chroma_local_installer::artefact::sha256_digest::Sha256Digest;
///
/// let digest = Sha256Digest::of_bytes(b"abc");
/// assert!(digest.matches_hex(
///     "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
/// ));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash an in-memory byte slice.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hash a file without loading it into memory.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be opened or read.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            hasher.update(chunk.get(..read).unwrap_or_default());
        }
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Whether `hex` names this digest, ignoring ASCII case and surrounding
    /// whitespace. Every byte is compared regardless of earlier mismatches.
    #[must_use]
    pub fn matches_hex(&self, hex: &str) -> bool {
        let ours = self.0.as_bytes();
        let theirs = hex.trim().as_bytes();
        ours.len() == theirs.len()
            && ours
                .iter()
                .zip(theirs)
                .fold(0u8, |diff, (a, b)| diff | (a ^ b.to_ascii_lowercase()))
                == 0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
