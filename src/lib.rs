//! Hermod - provider router with a semantic response cache
//!
//! Hermod sits between a conversational front end (phone webhook, chat API)
//! and a set of interchangeable language-model backends. For each request
//! it either returns a previously served answer to a semantically similar
//! question, or picks a backend according to live configuration, falls
//! back through the others on failure, and caches the result.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hermod::{ConfigStore, GatewayAdapter, Request, Router, ServerlessAdapter};
//!
//! #[tokio::main]
//! async fn main() -> hermod::Result<()> {
//!     let store = Arc::new(ConfigStore::open("hermod.json")?);
//!     let router = Router::builder(store)
//!         .adapter(ServerlessAdapter::new("runpod", "my-endpoint-id", "rp-key")?)
//!         .adapter(GatewayAdapter::new("openrouter", "sk-or-key")?)
//!         .build()?;
//!
//!     let response = router.route(&Request::new("My AC is broken")).await?;
//!     println!(
//!         "{} (via {}/{}, cached: {})",
//!         response.text, response.provider_used, response.model_used, response.served_from_cache
//!     );
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: live, validated, persisted routing policy
//! - [`similarity`]: text fingerprints and cosine similarity
//! - [`cache`]: the semantic response cache and quality scoring
//! - [`providers`]: the adapter contract and reference backends
//! - [`router`]: cache check, candidate selection and fallback dispatch

pub mod cache;
pub mod config;
pub mod error;
pub mod providers;
pub mod router;
#[cfg(feature = "cli")]
pub mod runtime;
pub mod similarity;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{Attempt, AttemptOutcome, EntityKind, HermodError, Result};
pub use router::{Router, RouterBuilder};

pub use cache::{CacheConfig, HeuristicQualityScorer, QualityScorer, SemanticCache};
pub use config::{
    CachingPolicy, ConfigChange, ConfigDocument, ConfigObserver, ConfigStore, GlobalCaching,
    ModelConfig, ProviderConfig, SystemPolicy,
};
pub use providers::{
    GatewayAdapter, LocalAdapter, ProviderAdapter, RetryConfig, RetryingAdapter,
    ServerlessAdapter,
};
pub use similarity::{Fingerprint, HashingEmbedder, TextEmbedder};
#[cfg(feature = "local-inference")]
pub use similarity::{FastEmbedEmbedder, LocalEmbeddingModel};

pub use types::{
    FailureKind, FinishReason, Health, ProviderFailure, ProviderResponse, Request, RoutedResponse,
    Usage,
};
pub use version::{PKG_VERSION, version_string};
