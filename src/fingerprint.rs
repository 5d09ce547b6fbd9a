//! Content fingerprints and stable identifiers.
//!
//! Both are SHA-256 based. Fingerprints are an identity hint for file
//! contents (truncated, so collisions are possible). Identifiers derived
//! with [`stable_id`] are seedless and therefore identical across runs,
//! which is what makes store upserts and cross-run deduplication work.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Fingerprint recorded when a file cannot be read.
pub const UNKNOWN_FINGERPRINT: &str = "unknown";

/// Number of hex characters kept from a digest.
pub const FINGERPRINT_LEN: usize = 16;

const READ_CHUNK: usize = 4096;

/// Hash a file's contents in fixed-size chunks.
///
/// Returns [`UNKNOWN_FINGERPRINT`] instead of an error so that one
/// unreadable file never aborts a scan.
pub fn file_fingerprint(path: &Path) -> String {
    match hash_file(path) {
        Ok(digest) => digest,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "cannot fingerprint file");
            UNKNOWN_FINGERPRINT.to_string()
        }
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(truncate(hex::encode(hasher.finalize())))
}

/// Deterministic short identifier over the concatenation of `parts`.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    truncate(hex::encode(hasher.finalize()))
}

/// Full-length SHA-256 hex digest of `text`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn truncate(mut digest: String) -> String {
    digest.truncate(FINGERPRINT_LEN);
    digest
}
