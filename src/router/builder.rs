//! Builder for configuring router instances

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::Router;
use super::health::{DEFAULT_HEALTH_TTL, HealthMemo};
use crate::cache::{CacheConfig, HeuristicQualityScorer, QualityScorer, SemanticCache};
use crate::config::ConfigStore;
use crate::providers::{LatencyTable, ProviderAdapter, RetryConfig, RetryingAdapter};
use crate::similarity::{HashingEmbedder, SharedEmbedder, TextEmbedder};
use crate::{HermodError, Result};

/// Default hard deadline for one provider call.
pub const DEFAULT_CANDIDATE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`Router`].
///
/// ```rust
/// # use std::sync::Arc;
/// # use hermod::{ConfigDocument, ConfigStore, Router};
/// # use std::time::Duration;
/// let store = Arc::new(ConfigStore::in_memory(ConfigDocument::default()).unwrap());
/// let router = Router::builder(store)
///     .candidate_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert!(router.providers().is_empty());
/// ```
pub struct RouterBuilder {
    config: Arc<ConfigStore>,
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    embedder: Option<SharedEmbedder>,
    scorer: Option<Arc<dyn QualityScorer>>,
    cache: Option<Arc<SemanticCache>>,
    retry: Option<RetryConfig>,
    candidate_timeout: Duration,
    health_ttl: Duration,
    min_cache_quality: f32,
    sweep_interval: Option<Duration>,
}

impl RouterBuilder {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            embedder: None,
            scorer: None,
            cache: None,
            retry: None,
            candidate_timeout: DEFAULT_CANDIDATE_TIMEOUT,
            health_ttl: DEFAULT_HEALTH_TTL,
            min_cache_quality: 0.0,
            sweep_interval: None,
        }
    }

    /// Register an adapter under its [`name()`](ProviderAdapter::name),
    /// which must match the provider name in the configuration. A later
    /// adapter with the same name replaces an earlier one.
    pub fn adapter(mut self, adapter: impl ProviderAdapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Register a shared adapter.
    pub fn adapter_arc(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Text embedder used for cache fingerprints. Default:
    /// [`HashingEmbedder`] with 384 dimensions.
    pub fn embedder(mut self, embedder: impl TextEmbedder + 'static) -> Self {
        self.embedder = Some(Arc::new(embedder));
        self
    }

    pub fn embedder_arc(mut self, embedder: SharedEmbedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Scorer applied to live responses before caching. Default:
    /// [`HeuristicQualityScorer`].
    pub fn quality_scorer(mut self, scorer: impl QualityScorer + 'static) -> Self {
        self.scorer = Some(Arc::new(scorer));
        self
    }

    /// Use an existing cache instead of creating one from the store's
    /// global caching settings.
    pub fn cache(mut self, cache: Arc<SemanticCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Wrap every adapter in a [`RetryingAdapter`].
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Hard deadline per candidate, unless the provider sets
    /// `timeout_secs`. Default: 30s.
    pub fn candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = timeout;
        self
    }

    /// How long a health probe result is trusted. Default: 10s.
    pub fn health_ttl(mut self, ttl: Duration) -> Self {
        self.health_ttl = ttl;
        self
    }

    /// Responses scoring at or below this are returned but not cached.
    /// Default: 0.0 (only empty answers are kept out).
    pub fn min_cache_quality(mut self, score: f32) -> Self {
        self.min_cache_quality = score;
        self
    }

    /// Purge expired cache entries on a timer in addition to the lazy
    /// purge on lookup. Requires a tokio runtime at build time.
    pub fn cache_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<Router> {
        if self.candidate_timeout.is_zero() {
            return Err(HermodError::Configuration(
                "candidate timeout must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_cache_quality) {
            return Err(HermodError::Configuration(format!(
                "min_cache_quality must be within [0, 1], got {}",
                self.min_cache_quality
            )));
        }

        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for adapter in self.adapters {
            let adapter = match &self.retry {
                Some(retry) if retry.max_attempts > 1 => {
                    Arc::new(RetryingAdapter::new(adapter, retry.clone())) as Arc<dyn ProviderAdapter>
                }
                _ => adapter,
            };
            adapters.insert(adapter.name().to_string(), adapter);
        }

        let doc = self.config.snapshot();
        for provider in doc.providers.values().filter(|p| p.enabled) {
            if !adapters.contains_key(&provider.name) {
                warn!(provider = %provider.name, "enabled provider has no adapter");
            }
        }

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(SemanticCache::new(CacheConfig::from(&doc.global_caching)))
        });
        self.config.subscribe(cache.clone());

        let sweeper = match self.sweep_interval {
            Some(interval) => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(HermodError::Configuration(
                        "cache sweeper requires a running tokio runtime".into(),
                    ));
                }
                Some(cache.spawn_sweeper(interval))
            }
            None => None,
        };

        Ok(Router {
            config: self.config,
            cache,
            embedder: self
                .embedder
                .unwrap_or_else(|| Arc::new(HashingEmbedder::default())),
            scorer: self
                .scorer
                .unwrap_or_else(|| Arc::new(HeuristicQualityScorer::default())),
            adapters,
            health: HealthMemo::new(self.health_ttl),
            latency: LatencyTable::default(),
            candidate_timeout: self.candidate_timeout,
            min_cache_quality: self.min_cache_quality,
            sweeper,
        })
    }
}
