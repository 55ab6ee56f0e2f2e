//! Predictive cache warming
//!
//! Two cooperating pieces: an access-pattern tracker that learns which files
//! are used when and together, and a memory-aware scheduler that walks the
//! dependency graph from priority roots, warming the content and artifact
//! levels ahead of demand.

mod scheduler;
mod tracker;
mod types;
mod warmer;

pub use scheduler::MemoryAwareWarmingScheduler;
pub use tracker::AccessPatternTracker;
pub use types::{WarmingStrategy, WarmingSummary};
pub use warmer::DependencyWarmer;
