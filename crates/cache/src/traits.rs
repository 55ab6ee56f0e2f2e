//! Seams to the external analysis collaborators
//!
//! The cache subsystem never parses anything itself; it stores and
//! invalidates opaque artifacts produced by a parser it is handed at
//! construction time.

use std::path::PathBuf;

/// The language-specific parser collaborator.
///
/// `A` is the parsed-artifact type; the cache treats it as opaque apart from
/// serialization for the persistence layer.
pub trait ArtifactParser<A>: Send + Sync {
    /// Parse raw file content into an artifact
    fn parse(&self, content: &[u8]) -> std::result::Result<A, ParseError>;

    /// Statically resolved import paths of an artifact, used to build
    /// dependency edges for incremental invalidation and warming
    fn extract_static_imports(&self, artifact: &A) -> Vec<PathBuf>;
}

/// Error surfaced by the external parser.
///
/// The cache layer reports it but never retries parsing on its own.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}
