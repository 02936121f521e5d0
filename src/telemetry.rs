//! Telemetry metric name constants.
//!
//! Centralised metric names for hermod operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `hermod_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name from the configuration store
//! - `model`: model the provider was invoked with
//! - `status`: outcome: "ok" or "error"
//! - `kind`: failure kind: "unavailable", "timeout", "rejected_input", "truncated"

/// Total routed requests.
///
/// Labels: `source` ("cache" | "provider" | "error").
pub const REQUESTS_TOTAL: &str = "hermod_requests_total";

/// End-to-end routing duration in seconds.
///
/// Labels: `source`.
pub const REQUEST_DURATION_SECONDS: &str = "hermod_request_duration_seconds";

/// Provider invocations.
///
/// Labels: `provider`, `model`, `status` ("ok" | "error").
pub const PROVIDER_CALLS_TOTAL: &str = "hermod_provider_calls_total";

/// Provider invocation duration in seconds.
///
/// Labels: `provider`.
pub const PROVIDER_DURATION_SECONDS: &str = "hermod_provider_duration_seconds";

/// Provider failures by kind.
///
/// Labels: `provider`, `model`, `kind`.
pub const PROVIDER_FAILURES_TOTAL: &str = "hermod_provider_failures_total";

/// Candidates skipped because their health was `Down`.
///
/// Labels: `provider`.
pub const PROVIDER_SKIPPED_TOTAL: &str = "hermod_provider_skipped_total";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "hermod_retries_total";

/// Semantic cache hits.
///
/// Labels: `model`.
pub const CACHE_HITS_TOTAL: &str = "hermod_cache_hits_total";

/// Semantic cache misses.
///
/// Labels: `model`.
pub const CACHE_MISSES_TOTAL: &str = "hermod_cache_misses_total";

/// Entries removed from the semantic cache.
///
/// Labels: `reason` ("capacity" | "expired" | "invalidated" | "unreadable").
pub const CACHE_EVICTIONS_TOTAL: &str = "hermod_cache_evictions_total";
