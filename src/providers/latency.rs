//! Per-provider latency tracking.
//!
//! [`ProviderLatency`] keeps an exponentially weighted moving average
//! (EWMA) of call durations for one provider; [`LatencyTable`] holds one per
//! provider name. The router records every dispatch (success or failure)
//! and exposes the averages for observability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Default EWMA smoothing factor.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Lock-free EWMA of call durations.
///
/// Higher `alpha` reacts faster to change; lower `alpha` smooths more.
pub struct ProviderLatency {
    // f64 micros stored as bits
    ewma_micros: AtomicU64,
    alpha: f64,
    count: AtomicU64,
}

impl ProviderLatency {
    pub fn new(alpha: f64) -> Self {
        Self {
            ewma_micros: AtomicU64::new(0_f64.to_bits()),
            alpha: alpha.clamp(0.0, 1.0),
            count: AtomicU64::new(0),
        }
    }

    /// Record one observation.
    ///
    /// Two threads racing on the very first observation may both seed the
    /// average; the error washes out after a few more samples.
    pub fn record(&self, duration: Duration) {
        let micros = duration.as_micros() as f64;
        let _ = self
            .ewma_micros
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let next = if self.count.load(Ordering::Relaxed) == 0 {
                    micros
                } else {
                    self.alpha * micros + (1.0 - self.alpha) * f64::from_bits(bits)
                };
                Some(next.to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Current estimate, or `None` before the first observation.
    pub fn average(&self) -> Option<Duration> {
        if self.count.load(Ordering::Relaxed) == 0 {
            return None;
        }
        let micros = f64::from_bits(self.ewma_micros.load(Ordering::Relaxed));
        Some(Duration::from_micros(micros as u64))
    }

    pub fn observation_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for ProviderLatency {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl std::fmt::Debug for ProviderLatency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLatency")
            .field("average", &self.average())
            .field("count", &self.observation_count())
            .finish()
    }
}

/// Latency trackers keyed by provider name, created on first use.
#[derive(Debug, Default)]
pub struct LatencyTable {
    trackers: RwLock<HashMap<String, Arc<ProviderLatency>>>,
}

impl LatencyTable {
    pub fn record(&self, provider: &str, duration: Duration) {
        self.tracker(provider).record(duration);
    }

    pub fn average(&self, provider: &str) -> Option<Duration> {
        self.trackers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .and_then(|t| t.average())
    }

    fn tracker(&self, provider: &str) -> Arc<ProviderLatency> {
        if let Some(tracker) = self
            .trackers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
        {
            return Arc::clone(tracker);
        }
        let mut trackers = self.trackers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(trackers.entry(provider.to_string()).or_default())
    }
}
