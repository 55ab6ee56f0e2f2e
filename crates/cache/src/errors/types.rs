//! Core error types for the cache subsystem

use std::path::PathBuf;
use std::time::Duration;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error type for cache operations
#[derive(Debug)]
pub enum CacheError {
    /// Source content could not be read (missing file, permissions, ...)
    ContentUnavailable {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// The external parser rejected the content
    ParseFailure {
        path: PathBuf,
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// An on-disk entry failed to deserialize; it has been deleted
    PersistenceCorrupt {
        key: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// A single entry is larger than the store's memory limit
    CapacityExceeded {
        key: String,
        requested_bytes: u64,
        max_memory_bytes: u64,
        recovery_hint: RecoveryHint,
    },

    /// I/O errors on the persistence layer
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// Serialization/deserialization errors
    Serialization {
        key: String,
        operation: SerializationOp,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },

    /// Configuration error
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints for error handling
#[derive(Debug, Clone)]
pub enum RecoveryHint {
    /// Retry the operation
    Retry { after: Duration },

    /// Retry the operation with exponential backoff
    RetryWithBackoff {
        initial_delay_ms: u64,
        max_retries: u32,
        backoff_multiplier: f64,
    },

    /// Increase cache capacity
    IncreaseCapacity { suggested_bytes: u64 },

    /// Check file permissions
    CheckPermissions { path: PathBuf },

    /// Run cache eviction
    RunEviction,

    /// Use a default value
    UseDefault { value: String },

    /// Recreate cache file/directory
    Recreate,

    /// Operation can be safely ignored
    Ignore,

    /// No automated recovery possible
    Manual { instructions: String },
}

/// Serialization operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationOp {
    Serialize,
    Deserialize,
}

impl CacheError {
    /// The recovery hint attached to this error
    pub fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::ContentUnavailable { recovery_hint, .. }
            | Self::ParseFailure { recovery_hint, .. }
            | Self::PersistenceCorrupt { recovery_hint, .. }
            | Self::CapacityExceeded { recovery_hint, .. }
            | Self::Io { recovery_hint, .. }
            | Self::Serialization { recovery_hint, .. }
            | Self::Configuration { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Build a `Configuration` error with a default hint
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            recovery_hint: RecoveryHint::Manual {
                instructions: "review the cache configuration".to_string(),
            },
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ContentUnavailable { source, .. } | Self::Io { source, .. } => Some(source),
            Self::Serialization { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
