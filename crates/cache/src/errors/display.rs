//! Display implementations for cache errors

use super::types::CacheError;
use std::fmt;

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentUnavailable {
                path,
                operation,
                source,
                ..
            } => write!(
                f,
                "content unavailable during {} on '{}': {}",
                operation,
                path.display(),
                source
            ),
            Self::ParseFailure { path, message, .. } => {
                write!(f, "parse failure for '{}': {}", path.display(), message)
            }
            Self::PersistenceCorrupt { key, reason, .. } => {
                write!(f, "persisted entry '{key}' is corrupt: {reason}")
            }
            Self::CapacityExceeded {
                key,
                requested_bytes,
                max_memory_bytes,
                ..
            } => write!(
                f,
                "entry '{key}' of {requested_bytes} bytes exceeds store limit of {max_memory_bytes} bytes"
            ),
            Self::Io {
                path,
                operation,
                source,
                ..
            } => write!(
                f,
                "I/O error during {} on '{}': {}",
                operation,
                path.display(),
                source
            ),
            Self::Serialization {
                key,
                operation,
                source,
                ..
            } => write!(f, "failed to {operation:?} cache entry '{key}': {source}"),
            Self::Configuration { message, .. } => {
                write!(f, "cache configuration error: {message}")
            }
        }
    }
}
