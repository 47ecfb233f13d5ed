//! Request fingerprints for duplicate detection.
//!
//! A fingerprint is SHA-256 over the normalized (method, url, body),
//! truncated to the configured length.

use crate::model::WorkItem;
use sha2::{Digest, Sha256};

pub const MAX_FINGERPRINT_SIZE: usize = 32;
pub const DEFAULT_FINGERPRINT_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Compute the fingerprint of `item`, truncated to `size` bytes (clamped to 1..=32).
    pub fn of(item: &WorkItem, size: usize) -> Self {
        let size = size.clamp(1, MAX_FINGERPRINT_SIZE);

        let mut hasher = Sha256::new();
        hasher.update(item.method.trim().to_ascii_uppercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalize_url(&item.url).as_bytes());
        hasher.update([0u8]);
        if let Some(ref body) = item.body {
            hasher.update(body);
        }

        let digest = hasher.finalize();
        Self(digest[..size].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Strip surrounding whitespace and the fragment; fragments never reach the server.
fn normalize_url(url: &str) -> &str {
    let url = url.trim();
    match url.find('#') {
        Some(idx) => &url[..idx],
        None => url,
    }
}
