//! Shared filesystem utilities for scour
//!
//! Small, dependency-light helpers used by the cache subsystem. Everything
//! here sticks to `std::io::Result` so callers can wrap failures in their
//! own error types.

pub mod atomic_file;
pub mod xdg;

pub use atomic_file::*;
pub use xdg::*;
