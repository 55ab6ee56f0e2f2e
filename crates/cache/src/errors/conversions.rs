//! Error conversion utilities

use super::types::{CacheError, RecoveryHint, SerializationOp};
use std::path::PathBuf;

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let recovery_hint = match error.kind() {
            ErrorKind::PermissionDenied => RecoveryHint::CheckPermissions {
                path: PathBuf::from("."),
            },
            ErrorKind::NotFound => RecoveryHint::Recreate,
            ErrorKind::WouldBlock | ErrorKind::TimedOut => RecoveryHint::RetryWithBackoff {
                initial_delay_ms: 100,
                max_retries: 3,
                backoff_multiplier: 2.0,
            },
            _ => RecoveryHint::Manual {
                instructions: "inspect the underlying I/O failure".to_string(),
            },
        };

        Self::Io {
            path: PathBuf::from("."),
            operation: "unknown",
            source: error,
            recovery_hint,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            key: String::new(),
            operation: SerializationOp::Deserialize,
            source: Box::new(error),
            recovery_hint: RecoveryHint::Recreate,
        }
    }
}

impl From<bincode::Error> for CacheError {
    fn from(error: bincode::Error) -> Self {
        Self::Serialization {
            key: String::new(),
            operation: SerializationOp::Deserialize,
            source: error,
            recovery_hint: RecoveryHint::Recreate,
        }
    }
}
