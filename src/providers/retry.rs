//! Retry configuration, delay calculation, and the adapter decorator.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! [`RetryingAdapter`], which wraps any [`ProviderAdapter`] with automatic
//! retry on transient failures (`Unavailable`, `Timeout`).
//!
//! Retrying happens inside one candidate's time budget: the router's
//! per-candidate timeout bounds the whole retry loop, so a retrying adapter
//! can never stall fallback to the next provider.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::{AdapterResult, ProviderAdapter};
use crate::telemetry;
use crate::types::{Health, ProviderFailure, ProviderResponse, Request};

/// Configuration for retry behaviour on transient failures.
///
/// Uses exponential backoff:
///
/// ```rust
/// # use hermod::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 2.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 250ms.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 5s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry number `attempt` (0-indexed):
    /// `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an adapter call with retry logic.
///
/// Retries on transient failures (as classified by
/// [`FailureKind::is_transient()`](crate::FailureKind::is_transient)) up to
/// `config.max_attempts`, using exponential backoff. Other failures are
/// returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    provider_name: &str,
    f: F,
) -> AdapterResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AdapterResult<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.kind.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL,
                        "provider" => provider_name.to_owned(),
                    )
                    .increment(1);
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        provider = provider_name,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e), // permanent failure, no retry
        }
    }
    Err(last_err.unwrap_or_else(|| ProviderFailure::unavailable("no attempt was made")))
}

// ============================================================================
// RetryingAdapter
// ============================================================================

/// Decorator that wraps a [`ProviderAdapter`] with retry logic.
///
/// Only the raw backend call is retried. Truncation is a property of the
/// answer rather than the transport, so a truncated response is reported
/// once and the router moves on.
pub struct RetryingAdapter {
    inner: Arc<dyn ProviderAdapter>,
    config: RetryConfig,
}

impl RetryingAdapter {
    pub fn new(inner: Arc<dyn ProviderAdapter>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ProviderAdapter for RetryingAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: &Request,
        model: &str,
        max_tokens: u32,
    ) -> AdapterResult<ProviderResponse> {
        with_retry(&self.config, self.inner.name(), || {
            self.inner.complete(request, model, max_tokens)
        })
        .await
    }

    async fn health(&self) -> Health {
        self.inner.health().await
    }
}
