//! Multi-level caching for the analysis engine
//!
//! Four cooperating cache levels sit between the engine and the filesystem:
//!
//! - [`FileContentCache`]: raw file bytes, validated against mtime
//! - [`ArtifactCache`]: parsed artifacts keyed by content identity, with
//!   optional compressed on-disk persistence
//! - [`IncrementalCache`]: partial analysis results with dependency-aware
//!   transitive invalidation
//! - [`StreamResultCache`]: bounded, backpressured delivery of live results
//!
//! A [`CoherenceManager`] cascades invalidations across levels from a
//! declared dependency table, and the warming module pre-fills the content
//! and artifact levels from dependency traversal and learned access
//! patterns. [`AnalysisCache`] bundles all of it behind one handle.

pub mod artifact;
pub mod coherence;
pub mod config;
pub mod content;
pub mod entry;
pub mod errors;
pub mod incremental;
pub mod keys;
pub mod manager;
pub mod store;
pub mod stream;
pub mod traits;
pub mod warming;

pub use artifact::{ArtifactCache, BulkWarmOutcome};
pub use coherence::{CacheLevel, CascadeRule, CoherenceManager, CoherentLevel};
pub use config::{default_coherence_table, CacheConfig, CoherenceConfig};
pub use content::{FileContent, FileContentCache};
pub use entry::StoreStats;
pub use errors::{CacheError, RecoveryHint, Result};
pub use incremental::IncrementalCache;
pub use keys::{path_key, ContentIdentity};
pub use manager::{AnalysisCache, CacheStatsReport, SweepOutcome};
pub use store::{EvictableStore, EvictionTuning, PressureLevel};
pub use stream::{BackpressurePolicy, StreamResultCache, StreamSubscriber};
pub use traits::{ArtifactParser, ParseError};
pub use warming::{
    AccessPatternTracker, DependencyWarmer, MemoryAwareWarmingScheduler, WarmingStrategy,
    WarmingSummary,
};
