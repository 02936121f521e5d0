//! Vector-indexed response cache.
//!
//! [`SemanticCache`] maps request fingerprints to previously served answers.
//! A lookup returns the most similar entry at or above a threshold, so a
//! paraphrase of an earlier question can be answered without calling a
//! provider. False positives are an accepted tradeoff for latency.
//!
//! # Selection
//!
//! Among entries with similarity ≥ threshold, the highest similarity wins;
//! ties go to the higher `quality_score`, then the more recent `created_at`.
//! Lowering the threshold can only add candidates, never remove them.
//!
//! # Eviction
//!
//! - **Capacity**: when `max_responses` is exceeded, the entry with the
//!   fewest hits goes first, oldest `created_at` breaking ties.
//! - **Age**: entries older than `max_age` are never served. They are
//!   purged lazily during lookups and inserts, and eagerly by the optional
//!   sweeper task ([`SemanticCache::spawn_sweeper`]).
//! - **Invalidation**: [`SemanticCache::invalidate`] removes entries
//!   matching a predicate. As a [`ConfigObserver`], the cache invalidates
//!   a provider's entries as soon as it is disabled.
//!
//! # Concurrency
//!
//! Entries sit behind a `RwLock<Vec<Arc<CacheEntry>>>`. Lookups scan under
//! the read lock; hit bookkeeping uses per-entry atomics, so concurrent
//! hits never take the write lock. Inserts, evictions and invalidations
//! take the write lock for the single mutation only. No method holds a lock
//! across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{ConfigChange, ConfigDocument, ConfigObserver, GlobalCaching};
use crate::similarity::Fingerprint;
use crate::telemetry;

/// Fingerprints at least this similar (for the same model) are treated as
/// the same question on insert.
const DUPLICATE_SIMILARITY: f32 = 1.0 - 1e-6;

/// Capacity and age limits.
///
/// ```rust
/// # use hermod::cache::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_responses(500)
///     .max_age(Duration::from_secs(6 * 3600));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached responses. Default: 1,000.
    pub max_responses: usize,
    /// Entries older than this are never served. Default: 24 hours.
    pub max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&GlobalCaching::default())
    }
}

impl From<&GlobalCaching> for CacheConfig {
    fn from(global: &GlobalCaching) -> Self {
        Self {
            max_responses: global.max_responses,
            max_age: Duration::from_secs(global.max_cache_age_hours.saturating_mul(3600)),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_responses(mut self, n: usize) -> Self {
        self.max_responses = n;
        self
    }

    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }
}

/// A cached answer.
///
/// Everything except hit bookkeeping is immutable after insert.
#[derive(Debug)]
pub struct CacheEntry {
    pub id: u64,
    pub fingerprint: Fingerprint,
    pub response_text: String,
    pub provider_used: String,
    pub model_used: String,
    pub quality_score: f32,
    pub created_at: Instant,
    hit_count: AtomicU64,
    // micros since the owning cache's epoch; 0 = never hit
    last_hit_micros: AtomicU64,
}

impl CacheEntry {
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    fn record_hit(&self, epoch: Instant, now: Instant) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
        let micros = now.saturating_duration_since(epoch).as_micros().max(1);
        self.last_hit_micros
            .store(u64::try_from(micros).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    fn last_hit_at(&self, epoch: Instant) -> Option<Instant> {
        match self.last_hit_micros.load(Ordering::Relaxed) {
            0 => None,
            micros => Some(epoch + Duration::from_micros(micros)),
        }
    }
}

/// Data for a new entry; the cache assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub fingerprint: Fingerprint,
    pub response_text: String,
    pub provider_used: String,
    pub model_used: String,
    pub quality_score: f32,
}

/// Result of [`SemanticCache::lookup`].
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: Arc<CacheEntry>,
    pub similarity: f32,
}

/// What [`SemanticCache::insert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(u64),
    /// A duplicate with lower quality was replaced.
    Replaced(u64),
    /// A duplicate with equal or higher quality is already cached.
    Kept(u64),
    /// Stored, then evicted at once for capacity: every other entry has
    /// been hit more often. The id is no longer cached.
    Evicted(u64),
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

/// Why entries left the cache.
#[derive(Debug, Clone, Copy)]
enum Removal {
    Capacity,
    Expired,
    Invalidated,
    Unreadable,
}

impl Removal {
    fn label(self) -> &'static str {
        match self {
            Removal::Capacity => "capacity",
            Removal::Expired => "expired",
            Removal::Invalidated => "invalidated",
            Removal::Unreadable => "unreadable",
        }
    }
}

/// In-memory semantic response cache. See module docs.
pub struct SemanticCache {
    entries: RwLock<Vec<Arc<CacheEntry>>>,
    config: RwLock<CacheConfig>,
    next_id: AtomicU64,
    epoch: Instant,
    counters: Counters,
}

impl SemanticCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            config: RwLock::new(config),
            next_id: AtomicU64::new(1),
            epoch: Instant::now(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        *self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap limits at runtime, enforcing the new ones immediately.
    pub fn set_config(&self, config: CacheConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        self.purge_expired();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        self.enforce_capacity(&mut entries, config.max_responses);
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Best entry with similarity ≥ `threshold`, or `None`.
    pub fn lookup(&self, fingerprint: &Fingerprint, threshold: f32) -> Option<CacheHit> {
        self.lookup_where(fingerprint, threshold, |_| true)
    }

    /// Like [`lookup`](Self::lookup), but entries for which `is_readable`
    /// returns false are skipped and purged (e.g. attributed to a provider
    /// that is no longer configured).
    pub fn lookup_where<F>(
        &self,
        fingerprint: &Fingerprint,
        threshold: f32,
        is_readable: F,
    ) -> Option<CacheHit>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let now = Instant::now();
        let max_age = self.config().max_age;
        let mut expired = Vec::new();
        let mut unreadable = Vec::new();
        let mut best: Option<CacheHit> = None;

        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            for entry in entries.iter() {
                if entry.age(now) > max_age {
                    expired.push(entry.id);
                    continue;
                }
                if !is_readable(entry) {
                    unreadable.push(entry.id);
                    continue;
                }
                let similarity = fingerprint.similarity(&entry.fingerprint);
                if similarity < threshold {
                    continue;
                }
                if best
                    .as_ref()
                    .is_none_or(|current| outranks(entry, similarity, current))
                {
                    best = Some(CacheHit {
                        entry: Arc::clone(entry),
                        similarity,
                    });
                }
            }
        }

        if !expired.is_empty() {
            self.remove_ids(&expired, Removal::Expired);
        }
        if !unreadable.is_empty() {
            self.remove_ids(&unreadable, Removal::Unreadable);
        }

        match best {
            Some(hit) => {
                hit.entry.record_hit(self.epoch, now);
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(hit)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    // ========================================================================
    // Insert / remove
    // ========================================================================

    /// Add an answer. A same-model duplicate fingerprint keeps whichever
    /// copy has the higher quality score.
    pub fn insert(&self, new: NewEntry) -> InsertOutcome {
        let now = Instant::now();
        let config = self.config();
        let quality_score = if new.quality_score.is_nan() {
            0.0
        } else {
            new.quality_score.clamp(0.0, 1.0)
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let expired_before = entries.len();
        entries.retain(|e| e.age(now) <= config.max_age);
        self.count_removed(expired_before - entries.len(), Removal::Expired);

        let duplicate = entries.iter().position(|e| {
            e.model_used == new.model_used
                && e.fingerprint.similarity(&new.fingerprint) >= DUPLICATE_SIMILARITY
        });
        let replaced = match duplicate {
            Some(idx) if entries[idx].quality_score >= quality_score => {
                debug!(id = entries[idx].id, "keeping higher-quality duplicate");
                return InsertOutcome::Kept(entries[idx].id);
            }
            Some(idx) => {
                entries.swap_remove(idx);
                true
            }
            None => false,
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(Arc::new(CacheEntry {
            id,
            fingerprint: new.fingerprint,
            response_text: new.response_text,
            provider_used: new.provider_used,
            model_used: new.model_used,
            quality_score,
            created_at: now,
            hit_count: AtomicU64::new(0),
            last_hit_micros: AtomicU64::new(0),
        }));
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        self.enforce_capacity(&mut entries, config.max_responses);

        if !entries.iter().any(|e| e.id == id) {
            InsertOutcome::Evicted(id)
        } else if replaced {
            InsertOutcome::Replaced(id)
        } else {
            InsertOutcome::Inserted(id)
        }
    }

    /// Remove every entry matching `predicate`. Returns how many went.
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| !predicate(e));
        let removed = before - entries.len();
        self.count_removed(removed, Removal::Invalidated);
        removed
    }

    pub fn invalidate_provider(&self, provider: &str) -> usize {
        let removed = self.invalidate(|e| e.provider_used == provider);
        info!(provider, removed, "invalidated cached responses for provider");
        removed
    }

    pub fn invalidate_model(&self, model: &str) -> usize {
        let removed = self.invalidate(|e| e.model_used == model);
        info!(model, removed, "invalidated cached responses for model");
        removed
    }

    pub fn clear(&self) -> usize {
        self.invalidate(|_| true)
    }

    /// Drop every entry older than the configured age.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let max_age = self.config().max_age;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| e.age(now) <= max_age);
        let removed = before - entries.len();
        self.count_removed(removed, Removal::Expired);
        removed
    }

    /// Run [`purge_expired`](Self::purge_expired) every `period` until the
    /// cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "cache sweep");
                }
            }
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries (including not-yet-purged expired ones).
    pub fn entries(&self) -> Vec<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// When `entry` was last served, if ever.
    pub fn last_hit_at(&self, entry: &CacheEntry) -> Option<Instant> {
        entry.last_hit_at(self.epoch)
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            inserts: c.inserts.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            expirations: c.expirations.load(Ordering::Relaxed),
            invalidations: c.invalidations.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn remove_ids(&self, ids: &[u64], reason: Removal) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|e| !ids.contains(&e.id));
        self.count_removed(before - entries.len(), reason);
    }

    /// Evict least-hit, then oldest, entries until within `max`.
    fn enforce_capacity(&self, entries: &mut Vec<Arc<CacheEntry>>, max: usize) {
        let mut evicted = 0;
        while entries.len() > max {
            let Some(victim) = entries
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    a.hit_count()
                        .cmp(&b.hit_count())
                        .then_with(|| a.created_at.cmp(&b.created_at))
                })
                .map(|(idx, _)| idx)
            else {
                break;
            };
            let entry = entries.swap_remove(victim);
            debug!(id = entry.id, hits = entry.hit_count(), "evicted for capacity");
            evicted += 1;
        }
        self.count_removed(evicted, Removal::Capacity);
    }

    fn count_removed(&self, n: usize, reason: Removal) {
        if n == 0 {
            return;
        }
        let counter = match reason {
            Removal::Capacity => &self.counters.evictions,
            Removal::Expired => &self.counters.expirations,
            Removal::Invalidated | Removal::Unreadable => &self.counters.invalidations,
        };
        counter.fetch_add(n as u64, Ordering::Relaxed);
        metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => reason.label())
            .increment(n as u64);
    }
}

impl Default for SemanticCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ConfigObserver for SemanticCache {
    fn on_change(&self, change: &ConfigChange, config: &ConfigDocument) {
        match change {
            ConfigChange::ProviderDisabled(provider)
            | ConfigChange::ProviderCachingDisabled(provider) => {
                self.invalidate_provider(provider);
            }
            ConfigChange::ModelCachingDisabled(model) | ConfigChange::ModelRemoved(model) => {
                self.invalidate_model(model);
            }
            ConfigChange::GlobalCachingChanged => {
                if !config.global_caching.enabled {
                    self.clear();
                }
                self.set_config(CacheConfig::from(&config.global_caching));
            }
            ConfigChange::Replaced => {
                self.clear();
                self.set_config(CacheConfig::from(&config.global_caching));
            }
        }
    }
}

/// Whether `entry` at `similarity` beats the current best hit.
fn outranks(entry: &CacheEntry, similarity: f32, current: &CacheHit) -> bool {
    if similarity != current.similarity {
        return similarity > current.similarity;
    }
    if entry.quality_score != current.entry.quality_score {
        return entry.quality_score > current.entry.quality_score;
    }
    entry.created_at > current.entry.created_at
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(values: &[f32]) -> Fingerprint {
        Fingerprint::new(values.to_vec())
    }

    fn entry(values: &[f32], provider: &str, quality: f32) -> NewEntry {
        NewEntry {
            fingerprint: fp(values),
            response_text: format!("answer from {provider}"),
            provider_used: provider.to_string(),
            model_used: "m".to_string(),
            quality_score: quality,
        }
    }

    #[test]
    fn config_from_global_converts_hours() {
        let config = CacheConfig::from(&GlobalCaching {
            max_cache_age_hours: 2,
            ..GlobalCaching::default()
        });
        assert_eq!(config.max_age, Duration::from_secs(7200));
    }

    #[test]
    fn lookup_respects_threshold() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[1.0, 0.0], "p1", 1.0));
        // cos(45°) ≈ 0.707
        let query = fp(&[1.0, 1.0]);
        assert!(cache.lookup(&query, 0.8).is_none());
        let hit = cache.lookup(&query, 0.7).unwrap();
        assert!((hit.similarity - 0.7071).abs() < 1e-3);
    }

    #[test]
    fn most_similar_entry_wins() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[1.0, 0.0, 0.0], "far", 1.0));
        cache.insert(entry(&[1.0, 1.0, 0.0], "near", 0.1));
        let hit = cache.lookup(&fp(&[1.0, 0.9, 0.0]), 0.5).unwrap();
        assert_eq!(hit.entry.provider_used, "near");
    }

    #[test]
    fn ties_go_to_quality_then_recency() {
        let cache = SemanticCache::default();
        let mut low = entry(&[1.0, 0.0], "low", 0.4);
        low.model_used = "a".into();
        let mut high = entry(&[1.0, 0.0], "high", 0.9);
        high.model_used = "b".into();
        let mut newer_high = entry(&[1.0, 0.0], "newer", 0.9);
        newer_high.model_used = "c".into();

        cache.insert(low);
        cache.insert(high);
        assert_eq!(
            cache.lookup(&fp(&[1.0, 0.0]), 0.9).unwrap().entry.provider_used,
            "high"
        );

        std::thread::sleep(Duration::from_millis(2));
        cache.insert(newer_high);
        assert_eq!(
            cache.lookup(&fp(&[1.0, 0.0]), 0.9).unwrap().entry.provider_used,
            "newer"
        );
    }

    #[test]
    fn duplicate_with_lower_quality_is_kept_out() {
        let cache = SemanticCache::default();
        let first = cache.insert(entry(&[0.0, 1.0], "good", 0.9));
        let second = cache.insert(entry(&[0.0, 1.0], "worse", 0.3));
        let InsertOutcome::Inserted(id) = first else {
            panic!("expected insert, got {first:?}");
        };
        assert_eq!(second, InsertOutcome::Kept(id));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.lookup(&fp(&[0.0, 1.0]), 0.9).unwrap().entry.provider_used,
            "good"
        );
    }

    #[test]
    fn duplicate_with_higher_quality_replaces() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[0.0, 1.0], "meh", 0.3));
        let outcome = cache.insert(entry(&[0.0, 1.0], "great", 0.8));
        assert!(matches!(outcome, InsertOutcome::Replaced(_)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_evicts_least_hit_then_oldest() {
        let cache = SemanticCache::new(CacheConfig::new().max_responses(2));
        cache.insert(entry(&[1.0, 0.0, 0.0], "a", 1.0));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert(entry(&[0.0, 1.0, 0.0], "b", 1.0));

        // "a" is older but has a hit, so "b" is the victim
        assert!(cache.lookup(&fp(&[1.0, 0.0, 0.0]), 0.99).is_some());
        cache.insert(entry(&[0.0, 0.0, 1.0], "c", 1.0));

        let mut providers: Vec<_> = cache
            .entries()
            .iter()
            .map(|e| e.provider_used.clone())
            .collect();
        providers.sort();
        assert_eq!(providers, ["a", "c"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn unreadable_entries_are_skipped_and_purged() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[1.0, 0.0], "gone", 1.0));
        let hit = cache.lookup_where(&fp(&[1.0, 0.0]), 0.5, |e| e.provider_used != "gone");
        assert!(hit.is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn hits_are_counted_on_the_entry() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[1.0, 0.0], "p", 1.0));
        let first = cache.lookup(&fp(&[1.0, 0.0]), 0.5).unwrap();
        assert!(cache.last_hit_at(&first.entry).is_some());
        cache.lookup(&fp(&[1.0, 0.0]), 0.5).unwrap();
        assert_eq!(first.entry.hit_count(), 2);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn invalidate_by_provider() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[1.0, 0.0], "p1", 1.0));
        cache.insert(entry(&[0.0, 1.0], "p2", 1.0));
        assert_eq!(cache.invalidate_provider("p1"), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entries()[0].provider_used, "p2");
    }

    #[test]
    fn quality_is_clamped() {
        let cache = SemanticCache::default();
        cache.insert(entry(&[1.0, 0.0], "p", 7.0));
        assert_eq!(cache.entries()[0].quality_score, 1.0);
    }
}
