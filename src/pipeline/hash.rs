//! Content fingerprints: SHA-256 over a document's raw bytes.
//!
//! The fingerprint is the conversion cache key. It depends on bytes only,
//! never on the file name, so two copies of the same item share one entry
//! while a substituted copy always misses.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Deterministic digest of a document's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex rendering, as used in logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint an in-memory byte slice.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Fingerprint(hasher.finalize().into())
}

/// Fingerprint any reader, consuming it to the end.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Fingerprint a file on disk.
///
/// Returns `None` when the file cannot be opened or read; callers treat that
/// as a cache miss.
pub fn fingerprint_file(path: &Path) -> Option<Fingerprint> {
    let result = File::open(path).and_then(fingerprint_reader);
    match result {
        Ok(fp) => Some(fp),
        Err(e) => {
            debug!("No fingerprint for {}: {}", path.display(), e);
            None
        }
    }
}
