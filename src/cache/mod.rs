//! Caching subsystem.
//!
//! - [`semantic::SemanticCache`]: fingerprint-indexed response cache
//!   consulted before any provider is called. See [`semantic`] module docs
//!   for selection and eviction rules.
//!
//! - [`quality::QualityScorer`]: rates responses before they are cached.
//!   The default [`HeuristicQualityScorer`] needs no model; plug in a
//!   different scorer through
//!   [`RouterBuilder::quality_scorer()`](crate::RouterBuilder::quality_scorer).

pub mod quality;
pub mod semantic;

pub use quality::{HeuristicQualityScorer, QualityScorer};
pub use semantic::{
    CacheConfig, CacheEntry, CacheHit, CacheStats, InsertOutcome, NewEntry, SemanticCache,
};
