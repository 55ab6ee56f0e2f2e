//! Content identity derivation shared by all cache levels
//!
//! Every level keys its entries off a [`ContentIdentity`]: a fast path
//! fingerprint (namespace partition, not a security boundary) paired with a
//! truncated cryptographic content fingerprint. Changing either the path or
//! the content changes the combined key, so stale entries become unreachable
//! rather than needing in-place mutation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// Number of bytes of the SHA-256 digest kept for the content fingerprint.
///
/// 16 bytes keeps accidental collisions negligible for corpora up to ~10^6
/// files while halving key size.
pub const CONTENT_FINGERPRINT_LEN: usize = 16;

/// Immutable identity of a (path, content) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentIdentity {
    /// xxh3 digest of the normalized path
    pub path_fingerprint: u64,
    /// Truncated SHA-256 digest of the file content
    pub content_fingerprint: [u8; CONTENT_FINGERPRINT_LEN],
    /// Stable string key: "{path_fingerprint}_{content_fingerprint}" in hex
    pub combined_key: String,
}

impl ContentIdentity {
    /// Derive the identity for a path and its content.
    ///
    /// Deterministic and pure: no I/O, no locking.
    pub fn derive(path: &Path, content: &[u8]) -> Self {
        let normalized = normalize_path(path);
        let path_fingerprint = xxh3_64(normalized.as_bytes());

        let digest = Sha256::digest(content);
        let mut content_fingerprint = [0u8; CONTENT_FINGERPRINT_LEN];
        content_fingerprint.copy_from_slice(&digest[..CONTENT_FINGERPRINT_LEN]);

        let combined_key = format!(
            "{:016x}_{}",
            path_fingerprint,
            hex::encode(content_fingerprint)
        );

        Self {
            path_fingerprint,
            content_fingerprint,
            combined_key,
        }
    }

    /// The combined-key prefix shared by every identity derived for `path`,
    /// regardless of content.
    ///
    /// Used for path-scoped bulk invalidation via prefix matching.
    pub fn path_key_prefix(path: &Path) -> String {
        format!("{:016x}_", xxh3_64(normalize_path(path).as_bytes()))
    }
}

/// Normalized string form of a path, shared by every level that keys
/// entries by path rather than by content identity.
pub fn path_key(path: &Path) -> String {
    normalize_path(path)
}

/// Normalize a path for fingerprinting.
///
/// Lexical normalization only: strips `.` components and backslash/slash
/// differences. Deliberately does not hit the filesystem (no symlink
/// resolution), keeping derivation pure.
fn normalize_path(path: &Path) -> String {
    use std::path::Component;

    let mut normalized = String::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::RootDir => normalized.push('/'),
            other => {
                if !normalized.is_empty() && !normalized.ends_with('/') {
                    normalized.push('/');
                }
                normalized.push_str(&other.as_os_str().to_string_lossy());
            }
        }
    }
    normalized
}
