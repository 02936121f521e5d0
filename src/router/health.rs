//! Memoized adapter health.
//!
//! Probing health on every request would cost the network round trip the
//! `Down` check exists to avoid, so results are kept in a moka cache for a
//! short TTL. Concurrent requests for the same provider share one probe.
//! A call that fails with `Unavailable` marks the provider `Down` until the
//! entry expires.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::time::Instant;
use tracing::debug;

use crate::providers::ProviderAdapter;
use crate::types::Health;

/// Default time a probe result is trusted.
pub const DEFAULT_HEALTH_TTL: Duration = Duration::from_secs(10);

pub(crate) struct HealthMemo {
    entries: Cache<String, Health>,
}

impl HealthMemo {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Memoized health, probing the adapter on miss. Returns by `deadline`
    /// at the latest, also when waiting on a probe started by another
    /// request. A probe that does not answer in time counts as `Down`.
    pub(crate) async fn check(&self, adapter: &Arc<dyn ProviderAdapter>, deadline: Instant) -> Health {
        let name = adapter.name().to_string();
        let memoized = self.entries.get_with(name, async {
            let health = tokio::time::timeout_at(deadline, adapter.health())
                .await
                .unwrap_or(Health::Down);
            debug!(provider = adapter.name(), ?health, "health probed");
            health
        });
        tokio::time::timeout_at(deadline, memoized)
            .await
            .unwrap_or(Health::Down)
    }

    pub(crate) async fn mark_down(&self, provider: &str) {
        self.entries.insert(provider.to_string(), Health::Down).await;
    }

    pub(crate) async fn record(&self, provider: &str, health: Health) {
        self.entries.insert(provider.to_string(), health).await;
    }
}
