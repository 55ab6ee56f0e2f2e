//! Error handling for the cache subsystem
//!
//! Typed errors with recovery hints, so callers can distinguish an
//! environmental failure (unreadable file, corrupt persisted entry) from a
//! misuse (oversized entry, bad configuration).

mod conversions;
mod display;
mod types;

pub use types::{CacheError, RecoveryHint, Result, SerializationOp};
