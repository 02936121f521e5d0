//! Tests for [`ConfigStore`] persistence and live updates.

use std::fs;
use std::sync::Arc;
use std::thread;

use hermod::{
    CachingPolicy, ConfigDocument, ConfigStore, GlobalCaching, HermodError, ModelConfig,
    ProviderConfig, SystemPolicy,
};

// =========================================================================
// Persistence
// =========================================================================

#[test]
fn open_writes_defaults_on_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("policy.json");

    let store = ConfigStore::open(&path).unwrap();

    assert!(path.exists());
    assert_eq!(store.export(), ConfigDocument::default());
    let on_disk = ConfigDocument::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, ConfigDocument::default());
}

#[test]
fn updates_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");

    {
        let store = ConfigStore::open(&path).unwrap();
        store.set_provider_enabled("ollama", true).unwrap();
        store
            .update_model(
                ModelConfig::new("llama-3-8b-instruct", "runpod", 512)
                    .caching(CachingPolicy::with_threshold(0.92)),
            )
            .unwrap();
        store
            .update_global_caching(GlobalCaching {
                max_responses: 250,
                ..GlobalCaching::default()
            })
            .unwrap();
    }

    let store = ConfigStore::open(&path).unwrap();
    assert!(store.get_provider("ollama").unwrap().enabled);
    let model = store.get_model("llama-3-8b-instruct").unwrap();
    assert_eq!(model.max_tokens, 512);
    assert_eq!(model.caching.threshold, Some(0.92));
    assert_eq!(store.get_global_caching().max_responses, 250);
}

#[test]
fn persistence_failure_keeps_in_memory_value() {
    let dir = tempfile::tempdir().unwrap();
    // The parent directory does not exist, so every write fails.
    let path = dir.path().join("missing").join("policy.json");
    let store = ConfigStore::with_path(ConfigDocument::default(), path).unwrap();

    let err = store.set_provider_enabled("ollama", true).unwrap_err();

    assert!(matches!(err, HermodError::Persistence(_)));
    assert!(store.get_provider("ollama").unwrap().enabled);
}

#[test]
fn reload_picks_up_external_edit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");
    let store = ConfigStore::open(&path).unwrap();

    let mut edited = ConfigDocument::default();
    edited.system.auto_switch = false;
    fs::write(&path, edited.to_json().unwrap()).unwrap();

    store.reload().unwrap();
    assert!(!store.get_policy().auto_switch);
}

#[test]
fn corrupt_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(ConfigStore::open(&path).is_err());
}

#[test]
fn invalid_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");
    let mut doc = ConfigDocument::default();
    doc.system.default_provider = "nowhere".into();
    fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let err = ConfigStore::open(&path).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn in_memory_reload_is_an_error() {
    let store = ConfigStore::in_memory(ConfigDocument::default()).unwrap();
    assert!(store.reload().is_err());
    assert!(store.path().is_none());
}

// =========================================================================
// Validation
// =========================================================================

#[test]
fn out_of_range_threshold_is_rejected() {
    let store = ConfigStore::in_memory(ConfigDocument::default()).unwrap();
    for threshold in [-0.1, 1.5, f32::NAN] {
        let err = store
            .update_provider(
                ProviderConfig::new("runpod", 1)
                    .default_model("llama-3-8b-instruct")
                    .caching(CachingPolicy::with_threshold(threshold)),
            )
            .unwrap_err();
        assert!(err.is_configuration_error(), "threshold {threshold}");
    }
    assert_eq!(store.get_provider("runpod").unwrap().caching.threshold, None);
}

#[test]
fn policy_must_name_configured_providers() {
    let store = ConfigStore::in_memory(ConfigDocument::default()).unwrap();
    let err = store
        .update_policy(SystemPolicy::new("runpod", "bedrock"))
        .unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn disabled_default_needs_fallback_enabled() {
    let store = ConfigStore::in_memory(ConfigDocument::default()).unwrap();
    let mut policy = store.get_policy();
    policy.fallback_enabled = false;
    store.update_policy(policy).unwrap();

    assert!(store.set_provider_enabled("runpod", false).is_err());
    assert!(store.get_provider("runpod").unwrap().enabled);
}

#[test]
fn version_increases_per_commit() {
    let store = ConfigStore::in_memory(ConfigDocument::default()).unwrap();
    let v0 = store.version();
    store.set_provider_enabled("ollama", true).unwrap();
    store.set_provider_enabled("ollama", false).unwrap();
    assert_eq!(store.version(), v0 + 2);

    let _ = store.update_policy(SystemPolicy::new("x", "y"));
    assert_eq!(store.version(), v0 + 2, "rejected updates do not bump the version");
}

// =========================================================================
// Concurrency
// =========================================================================

#[test]
fn concurrent_writers_all_land() {
    let store = Arc::new(ConfigStore::in_memory(ConfigDocument::default()).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .update_model(ModelConfig::new(format!("model-{i}"), "openrouter", 128))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let doc = store.snapshot();
    for i in 0..8 {
        assert!(doc.models.contains_key(&format!("model-{i}")));
    }
}

#[test]
fn snapshots_are_immutable() {
    let store = ConfigStore::in_memory(ConfigDocument::default()).unwrap();
    let before = store.snapshot();
    store.set_provider_enabled("ollama", true).unwrap();

    assert!(!before.is_enabled("ollama"));
    assert!(store.snapshot().is_enabled("ollama"));
}
