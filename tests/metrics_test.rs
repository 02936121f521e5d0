//! Tests for metrics emitted while routing.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};

use hermod::providers::AdapterResult;
use hermod::telemetry;
use hermod::{
    ConfigDocument, ConfigStore, FailureKind, Health, ModelConfig, ProviderAdapter,
    ProviderConfig, ProviderFailure, ProviderResponse, Request, Router, SystemPolicy,
};

// ============================================================================
// Mock adapters
// ============================================================================

struct AnsweringAdapter {
    name: &'static str,
}

#[async_trait]
impl ProviderAdapter for AnsweringAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, _: &Request, _: &str, _: u32) -> AdapterResult<ProviderResponse> {
        Ok(ProviderResponse::new("A technician will call you back shortly."))
    }

    async fn health(&self) -> Health {
        Health::Healthy
    }
}

struct FailingAdapter {
    name: &'static str,
    kind: FailureKind,
}

#[async_trait]
impl ProviderAdapter for FailingAdapter {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, _: &Request, _: &str, _: u32) -> AdapterResult<ProviderResponse> {
        Err(ProviderFailure::new(self.kind, "scripted failure"))
    }

    async fn health(&self) -> Health {
        Health::Healthy
    }
}

struct DownAdapter;

#[async_trait]
impl ProviderAdapter for DownAdapter {
    fn name(&self) -> &str {
        "p1"
    }

    async fn complete(&self, _: &Request, _: &str, _: u32) -> AdapterResult<ProviderResponse> {
        Ok(ProviderResponse::new("unreachable."))
    }

    async fn health(&self) -> Health {
        Health::Down
    }
}

fn store() -> Arc<ConfigStore> {
    let mut doc = ConfigDocument::empty(SystemPolicy::new("p1", "p2"));
    doc.insert_provider(ProviderConfig::new("p1", 1).default_model("m1"));
    doc.insert_provider(ProviderConfig::new("p2", 2).default_model("m2"));
    doc.insert_model(ModelConfig::new("m1", "p1", 64));
    doc.insert_model(ModelConfig::new("m2", "p2", 64));
    Arc::new(ConfigStore::in_memory(doc).unwrap())
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    counter_with_label(snapshot, name, None)
}

/// Sum counter values for `name`, optionally restricted to one label value.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .filter(|(key, _, _, _)| {
            label.is_none_or(|(k, v)| key.key().labels().any(|l| l.key() == k && l.value() == v))
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

/// Drive `work` to completion inside a local recorder scope.
///
/// `block_in_place` keeps the sync `with_local_recorder` closure on the
/// current thread while `block_on` drives the inner async work.
fn record(work: impl Future<Output = ()>) -> SnapshotVec {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(work))
    });
    snapshotter.snapshot().into_vec()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn provider_request_records_metrics() {
    let router = Router::builder(store())
        .adapter(AnsweringAdapter { name: "p1" })
        .build()
        .unwrap();

    let snapshot = record(async {
        router.route(&Request::new("My AC is broken")).await.unwrap();
    });

    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, Some(("source", "provider"))),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::REQUEST_DURATION_SECONDS));
    assert_eq!(
        counter_with_label(&snapshot, telemetry::PROVIDER_CALLS_TOTAL, Some(("status", "ok"))),
        1
    );
    assert!(has_histogram(&snapshot, telemetry::PROVIDER_DURATION_SECONDS));
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_MISSES_TOTAL, Some(("model", "m1"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn cache_hit_is_counted_by_model() {
    let router = Router::builder(store())
        .adapter(AnsweringAdapter { name: "p1" })
        .build()
        .unwrap();

    let snapshot = record(async {
        router.route(&Request::new("My AC is broken")).await.unwrap();
        let again = router.route(&Request::new("My AC is broken")).await.unwrap();
        assert!(again.served_from_cache);
    });

    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_HITS_TOTAL, Some(("model", "m1"))),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, Some(("source", "cache"))),
        1
    );
    assert_eq!(counter_total(&snapshot, telemetry::PROVIDER_CALLS_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn failures_are_counted_by_kind() {
    let router = Router::builder(store())
        .adapter(FailingAdapter {
            name: "p1",
            kind: FailureKind::Timeout,
        })
        .adapter(FailingAdapter {
            name: "p2",
            kind: FailureKind::RejectedInput,
        })
        .build()
        .unwrap();

    let snapshot = record(async {
        assert!(router.route(&Request::new("My AC is broken")).await.is_err());
    });

    assert_eq!(
        counter_with_label(&snapshot, telemetry::PROVIDER_FAILURES_TOTAL, Some(("kind", "timeout"))),
        1
    );
    assert_eq!(
        counter_with_label(
            &snapshot,
            telemetry::PROVIDER_FAILURES_TOTAL,
            Some(("kind", "rejected_input"))
        ),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REQUESTS_TOTAL, Some(("source", "error"))),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn down_provider_is_counted_as_skipped() {
    let router = Router::builder(store())
        .adapter(DownAdapter)
        .adapter(AnsweringAdapter { name: "p2" })
        .build()
        .unwrap();

    let snapshot = record(async {
        router.route(&Request::new("My AC is broken")).await.unwrap();
    });

    assert_eq!(
        counter_with_label(&snapshot, telemetry::PROVIDER_SKIPPED_TOTAL, Some(("provider", "p1"))),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::PROVIDER_CALLS_TOTAL, Some(("provider", "p1"))),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn invalidation_is_counted_as_eviction() {
    let store = store();
    let router = Router::builder(store.clone())
        .adapter(AnsweringAdapter { name: "p1" })
        .adapter(AnsweringAdapter { name: "p2" })
        .build()
        .unwrap();

    let snapshot = record(async {
        router.route(&Request::new("My AC is broken")).await.unwrap();
        store.set_provider_enabled("p1", false).unwrap();
    });

    assert_eq!(
        counter_with_label(
            &snapshot,
            telemetry::CACHE_EVICTIONS_TOTAL,
            Some(("reason", "invalidated"))
        ),
        1
    );
}

#[tokio::test]
async fn metrics_are_noop_without_recorder() {
    // Verify no panics when no recorder is installed.
    let router = Router::builder(store())
        .adapter(AnsweringAdapter { name: "p1" })
        .build()
        .unwrap();
    router.route(&Request::new("hello there")).await.unwrap();
}
