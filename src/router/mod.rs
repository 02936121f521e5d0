//! The provider router.
//!
//! [`Router::route`] runs one request through a small state machine with
//! two terminal states, served or exhausted:
//!
//! ```text
//!            ┌────────────┐  hit   ┌──────────────────┐
//! request ──►│ CacheCheck │──────►│ Served (cached)  │
//!            └─────┬──────┘       └──────────────────┘
//!                  │ miss / caching off
//!                  ▼
//!         ┌──────────────────┐
//!         │ ProviderSelection│  hint → default → fallback → priority
//!         └────────┬─────────┘
//!                  ▼
//!         ┌──────────────────┐ success ┌─────────────────┐
//!         │    Dispatch      │────────►│ Served (live)   │──► cache insert
//!         │ health · invoke  │         └─────────────────┘
//!         └────────┬─────────┘
//!                  │ every candidate failed or was down
//!                  ▼
//!         RoutingExhausted { attempts }
//! ```
//!
//! Configuration is read from one [`ConfigStore`] snapshot per request, so
//! an admin update takes effect on the next request without restarts and a
//! single request never sees half an update.
//!
//! Every provider call runs under a hard per-candidate deadline
//! (`tokio::time::timeout`). Dropping the `route` future abandons the
//! in-flight call. The cache write that follows a successful call is
//! synchronous, so a response that was fully received is always cached.

mod builder;
mod health;
pub mod selection;

pub use builder::RouterBuilder;
pub use health::DEFAULT_HEALTH_TTL;
pub use selection::{Candidate, Selection};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::cache::{NewEntry, QualityScorer, SemanticCache};
use crate::config::{ConfigDocument, ConfigStore};
use crate::error::{Attempt, AttemptOutcome};
use crate::providers::{LatencyTable, ProviderAdapter};
use crate::similarity::{Fingerprint, SharedEmbedder};
use crate::telemetry;
use crate::types::{FailureKind, Health, ProviderFailure, ProviderResponse, Request, RoutedResponse};
use crate::{HermodError, Result};

use health::HealthMemo;

/// Routes requests to cached answers or provider adapters.
///
/// Cheap to share: wrap in an `Arc` and call [`route`](Self::route) from
/// as many tasks as needed. No lock is held across a provider call.
pub struct Router {
    config: Arc<ConfigStore>,
    cache: Arc<SemanticCache>,
    embedder: SharedEmbedder,
    scorer: Arc<dyn QualityScorer>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    health: HealthMemo,
    latency: LatencyTable,
    candidate_timeout: Duration,
    min_cache_quality: f32,
    sweeper: Option<JoinHandle<()>>,
}

/// Outcome of the cache check for one request.
struct CacheProbe {
    fingerprint: Option<Fingerprint>,
    threshold: Option<f32>,
}

impl Router {
    pub fn builder(config: Arc<ConfigStore>) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    /// Serve `request` from the cache or from the first provider that
    /// succeeds.
    #[instrument(
        skip(self, request),
        fields(conversation_id = ?request.conversation_id, model_hint = ?request.model_hint)
    )]
    pub async fn route(&self, request: &Request) -> Result<RoutedResponse> {
        let start = Instant::now();
        let result = self.route_inner(request).await;
        let source = match &result {
            Ok(response) if response.served_from_cache => "cache",
            Ok(_) => "provider",
            Err(_) => "error",
        };
        metrics::counter!(telemetry::REQUESTS_TOTAL, "source" => source).increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "source" => source)
            .record(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!(error = %e, kind = e.kind(), "request not served");
        }
        result
    }

    async fn route_inner(&self, request: &Request) -> Result<RoutedResponse> {
        let doc = self.config.snapshot();
        let selection = selection::select(&doc, request)?;

        // CacheCheck
        let probe = match self.cache_check(&doc, &selection, request) {
            Ok(hit) => return Ok(hit),
            Err(probe) => probe,
        };

        // Dispatch
        let policy = &doc.system;
        let mut attempts = Vec::with_capacity(selection.candidates.len());
        let mut dispatched = false;

        for candidate in &selection.candidates {
            if dispatched && !policy.auto_switch {
                debug!(provider = %candidate.provider, "auto_switch off, not trying further candidates");
                break;
            }

            let Some(adapter) = self.adapters.get(&candidate.provider) else {
                warn!(provider = %candidate.provider, "no adapter registered for provider");
                attempts.push(attempt(candidate, AttemptOutcome::NoAdapter));
                continue;
            };

            // One budget covers both the health probe and the call.
            let budget = candidate.timeout.unwrap_or(self.candidate_timeout);
            let deadline = tokio::time::Instant::now() + budget;
            if self.health.check(adapter, deadline).await == Health::Down {
                info!(provider = %candidate.provider, "skipping provider reported down");
                metrics::counter!(telemetry::PROVIDER_SKIPPED_TOTAL,
                    "provider" => candidate.provider.clone(),
                )
                .increment(1);
                attempts.push(attempt(candidate, AttemptOutcome::SkippedDown));
                continue;
            }

            dispatched = true;
            match self.dispatch(adapter, candidate, request, budget, deadline).await {
                Ok(response) => {
                    // No await between here and the return: a received
                    // response is cached even if the caller has gone.
                    self.store_response(&doc, &probe, candidate, request, &response);
                    return Ok(RoutedResponse {
                        text: response.text,
                        provider_used: candidate.provider.clone(),
                        model_used: candidate.model.clone(),
                        served_from_cache: false,
                        similarity: None,
                        threshold: probe.threshold,
                    });
                }
                Err(failure) => {
                    if failure.kind == FailureKind::Unavailable {
                        self.health.mark_down(&candidate.provider).await;
                    }
                    attempts.push(attempt(candidate, AttemptOutcome::Failed(failure)));
                }
            }
        }

        Err(HermodError::RoutingExhausted { attempts })
    }

    /// Look for a cached answer. `Err` carries what the miss path needs.
    fn cache_check(
        &self,
        doc: &ConfigDocument,
        selection: &Selection,
        request: &Request,
    ) -> std::result::Result<RoutedResponse, CacheProbe> {
        if !doc.global_caching.enabled {
            return Err(CacheProbe {
                fingerprint: None,
                threshold: None,
            });
        }

        let fingerprint = match self.embedder.embed(&request.text) {
            Ok(fp) => fp,
            Err(e) => {
                warn!(error = %e, embedder = self.embedder.name(), "embedding failed, bypassing cache");
                return Err(CacheProbe {
                    fingerprint: None,
                    threshold: None,
                });
            }
        };

        let (model, provider) = match selection.primary() {
            Some(c) => (Some(c.model.as_str()), Some(c.provider.as_str())),
            None => (None, None),
        };
        if !doc.caching_enabled(model, provider) {
            debug!(?model, ?provider, "caching disabled for primary candidate");
            return Err(CacheProbe {
                fingerprint: Some(fingerprint),
                threshold: None,
            });
        }

        let threshold = doc.resolve_threshold(model, provider);
        let model_label = model.unwrap_or("").to_string();
        let hit = self.cache.lookup_where(&fingerprint, threshold, |entry| {
            doc.is_enabled(&entry.provider_used)
                && doc.models.contains_key(&entry.model_used)
                && doc.caching_enabled(Some(&entry.model_used), Some(&entry.provider_used))
        });

        match hit {
            Some(hit) => {
                info!(
                    provider = %hit.entry.provider_used,
                    model = %hit.entry.model_used,
                    similarity = hit.similarity,
                    threshold,
                    "cache hit"
                );
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "model" => model_label).increment(1);
                Ok(RoutedResponse {
                    text: hit.entry.response_text.clone(),
                    provider_used: hit.entry.provider_used.clone(),
                    model_used: hit.entry.model_used.clone(),
                    served_from_cache: true,
                    similarity: Some(hit.similarity),
                    threshold: Some(threshold),
                })
            }
            None => {
                debug!(?model, threshold, "cache miss");
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "model" => model_label).increment(1);
                Err(CacheProbe {
                    fingerprint: Some(fingerprint),
                    threshold: Some(threshold),
                })
            }
        }
    }

    /// One provider call under a hard deadline.
    #[instrument(skip_all, fields(provider = %candidate.provider, model = %candidate.model))]
    async fn dispatch(
        &self,
        adapter: &Arc<dyn ProviderAdapter>,
        candidate: &Candidate,
        request: &Request,
        budget: Duration,
        deadline: tokio::time::Instant,
    ) -> std::result::Result<ProviderResponse, ProviderFailure> {
        let start = Instant::now();
        let outcome = tokio::time::timeout_at(
            deadline,
            adapter.invoke(request, &candidate.model, candidate.max_tokens),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ProviderFailure::timeout(format!(
                "no response within {}ms",
                budget.as_millis()
            )))
        });
        let elapsed = start.elapsed();
        self.latency.record(&candidate.provider, elapsed);

        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::PROVIDER_CALLS_TOTAL,
            "provider" => candidate.provider.clone(),
            "model" => candidate.model.clone(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::PROVIDER_DURATION_SECONDS,
            "provider" => candidate.provider.clone(),
        )
        .record(elapsed.as_secs_f64());

        if let Err(failure) = &outcome {
            warn!(
                kind = %failure.kind,
                detail = %failure.detail,
                elapsed_ms = elapsed.as_millis() as u64,
                "provider failed"
            );
            metrics::counter!(telemetry::PROVIDER_FAILURES_TOTAL,
                "provider" => candidate.provider.clone(),
                "model" => candidate.model.clone(),
                "kind" => failure.kind.as_str(),
            )
            .increment(1);
        }
        outcome
    }

    fn store_response(
        &self,
        doc: &ConfigDocument,
        probe: &CacheProbe,
        candidate: &Candidate,
        request: &Request,
        response: &ProviderResponse,
    ) {
        let Some(fingerprint) = &probe.fingerprint else {
            return;
        };
        if !doc.caching_enabled(Some(&candidate.model), Some(&candidate.provider)) {
            return;
        }
        let quality_score = self.scorer.score(request, response);
        if quality_score <= self.min_cache_quality {
            debug!(quality_score, "response below cache quality floor");
            return;
        }
        let outcome = self.cache.insert(NewEntry {
            fingerprint: fingerprint.clone(),
            response_text: response.text.clone(),
            provider_used: candidate.provider.clone(),
            model_used: candidate.model.clone(),
            quality_score,
        });
        debug!(?outcome, quality_score, "response cached");
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Probe every registered adapter concurrently, refreshing the memo.
    pub async fn health_report(&self) -> Vec<(String, Health)> {
        let probes = self.adapters.iter().map(|(name, adapter)| async move {
            let health = tokio::time::timeout(self.candidate_timeout, adapter.health())
                .await
                .unwrap_or(Health::Down);
            self.health.record(name, health).await;
            (name.clone(), health)
        });
        let mut report = join_all(probes).await;
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }

    /// EWMA of call durations for a provider, if it has been called.
    pub fn latency(&self, provider: &str) -> Option<Duration> {
        self.latency.average(provider)
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    /// Registered adapter names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("providers", &self.providers())
            .field("embedder", &self.embedder.name())
            .field("candidate_timeout", &self.candidate_timeout)
            .field("cached_responses", &self.cache.len())
            .finish_non_exhaustive()
    }
}

fn attempt(candidate: &Candidate, outcome: AttemptOutcome) -> Attempt {
    Attempt {
        provider: candidate.provider.clone(),
        model: candidate.model.clone(),
        outcome,
    }
}
