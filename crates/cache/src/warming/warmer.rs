//! Single-file warm operation shared by the scheduler's workers

use crate::artifact::ArtifactCache;
use crate::content::FileContentCache;
use crate::errors::Result;
use crate::incremental::IncrementalCache;
use crate::traits::ArtifactParser;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Warms one file through the content and artifact levels and reports its
/// outgoing dependency edges for the traversal to follow.
pub struct DependencyWarmer<A, R> {
    content: Arc<FileContentCache>,
    artifacts: Arc<ArtifactCache<A>>,
    incremental: Arc<IncrementalCache<R>>,
    parser: Arc<dyn ArtifactParser<A>>,
}

impl<A, R> DependencyWarmer<A, R>
where
    A: Serialize + DeserializeOwned + Send + Sync + 'static,
    R: Clone + Serialize + DeserializeOwned,
{
    pub fn new(
        content: Arc<FileContentCache>,
        artifacts: Arc<ArtifactCache<A>>,
        incremental: Arc<IncrementalCache<R>>,
        parser: Arc<dyn ArtifactParser<A>>,
    ) -> Self {
        Self {
            content,
            artifacts,
            incremental,
            parser,
        }
    }

    /// Load and parse one file, returning the paths it depends on.
    ///
    /// Recorded dependency edges are preferred; when the file has never been
    /// analyzed, static imports are extracted from the fresh artifact and
    /// recorded so the next traversal skips the extraction.
    pub fn warm_one(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let content = self.content.get_or_load(path)?;
        let artifact = self.artifacts.get_or_parse(
            path,
            &content.identity,
            &content.bytes,
            self.parser.as_ref(),
        )?;

        if let Some(deps) = self.incremental.dependencies_of(path) {
            return Ok(deps);
        }

        let imports = self.parser.extract_static_imports(&artifact);
        self.incremental.record_dependencies(path, &imports);
        Ok(imports)
    }

    /// Combined memory pressure across the levels warming fills
    pub fn usage_ratio(&self) -> f64 {
        self.content.usage_ratio().max(self.artifacts.usage_ratio())
    }
}
