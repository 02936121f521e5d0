//! Live configuration store.
//!
//! [`ConfigStore`] owns the [`ConfigDocument`] and is the only place it is
//! mutated. Readers take a cheap `Arc` snapshot; writers are serialized by a
//! dedicated mutex so validation and persistence never hold the read lock.
//!
//! # Update flow
//!
//! ```text
//! update_provider(p)
//!   │  lock writer mutex
//!   ├─ clone current document, apply change
//!   ├─ validate whole document ──► Err(Configuration) (nothing applied)
//!   ├─ swap snapshot, bump version
//!   ├─ notify observers (e.g. cache invalidation)
//!   └─ persist to disk ──► Err(Persistence) (in-memory value stays applied)
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tracing::{info, warn};

use super::document::{ConfigDocument, GlobalCaching, ModelConfig, ProviderConfig, SystemPolicy};
use crate::error::EntityKind;
use crate::{HermodError, Result};

/// A committed change other components may need to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    /// Provider went from enabled to disabled.
    ProviderDisabled(String),
    /// Caching was switched off for one provider.
    ProviderCachingDisabled(String),
    /// Caching was switched off for one model.
    ModelCachingDisabled(String),
    /// Model was removed from the document.
    ModelRemoved(String),
    /// Global caching settings changed (capacity, age, enabled flag).
    GlobalCachingChanged,
    /// The whole document was replaced (reset or reload).
    Replaced,
}

/// Receives [`ConfigChange`]s synchronously after each commit.
pub trait ConfigObserver: Send + Sync {
    fn on_change(&self, change: &ConfigChange, config: &ConfigDocument);
}

/// Single source of truth for provider/model/policy configuration.
pub struct ConfigStore {
    current: RwLock<Arc<ConfigDocument>>,
    writer: Mutex<()>,
    version: AtomicU64,
    path: Option<PathBuf>,
    observers: RwLock<Vec<Weak<dyn ConfigObserver>>>,
}

impl ConfigStore {
    /// Store that is never written to disk.
    pub fn in_memory(doc: ConfigDocument) -> Result<Self> {
        Self::build(doc, None)
    }

    /// Store that persists to `path` on every update, starting from `doc`
    /// without writing it first.
    pub fn with_path(doc: ConfigDocument, path: impl Into<PathBuf>) -> Result<Self> {
        Self::build(doc, Some(path.into()))
    }

    /// Load the document at `path`, or write and use the defaults when the
    /// file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let doc = read_document(path)?;
            info!(path = %path.display(), "loaded configuration");
            return Self::build(doc, Some(path.to_path_buf()));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                HermodError::Persistence(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let store = Self::build(ConfigDocument::default(), Some(path.to_path_buf()))?;
        store.persist(&store.snapshot())?;
        info!(path = %path.display(), "wrote default configuration");
        Ok(store)
    }

    fn build(mut doc: ConfigDocument, path: Option<PathBuf>) -> Result<Self> {
        doc.normalize();
        doc.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(doc)),
            writer: Mutex::new(()),
            version: AtomicU64::new(1),
            path,
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Register an observer for committed changes.
    ///
    /// The store holds observers weakly: once the last `Arc` elsewhere is
    /// dropped the observer stops receiving changes and is pruned.
    pub fn subscribe(&self, observer: Arc<dyn ConfigObserver>) {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|o| o.strong_count() > 0);
        observers.push(Arc::downgrade(&observer));
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Consistent view of the whole document. Hold it for one request at most.
    pub fn snapshot(&self) -> Arc<ConfigDocument> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Monotonic counter, bumped on every committed change.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn get_provider(&self, name: &str) -> Result<ProviderConfig> {
        self.snapshot()
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Provider, name))
    }

    pub fn get_model(&self, name: &str) -> Result<ModelConfig> {
        self.snapshot()
            .models
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Model, name))
    }

    pub fn get_policy(&self) -> SystemPolicy {
        self.snapshot().system.clone()
    }

    pub fn get_global_caching(&self) -> GlobalCaching {
        self.snapshot().global_caching
    }

    /// Full current configuration, for the dashboard's export.
    pub fn export(&self) -> ConfigDocument {
        (*self.snapshot()).clone()
    }

    pub fn export_json(&self) -> Result<String> {
        self.snapshot().to_json()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Updates
    // ========================================================================

    /// Insert or replace a provider. Returns the validated value.
    pub fn update_provider(&self, provider: ProviderConfig) -> Result<ProviderConfig> {
        self.commit(|doc| {
            let mut provider = provider;
            if provider.endpoint_ref.is_empty() {
                provider.endpoint_ref.clone_from(&provider.name);
            }
            let mut changes = Vec::new();
            if let Some(previous) = doc.providers.get(&provider.name) {
                if previous.enabled && !provider.enabled {
                    changes.push(ConfigChange::ProviderDisabled(provider.name.clone()));
                }
                if previous.caching.enabled && !provider.caching.enabled {
                    changes.push(ConfigChange::ProviderCachingDisabled(provider.name.clone()));
                }
            }
            doc.insert_provider(provider.clone());
            Ok((provider, changes))
        })
    }

    /// Shorthand for flipping a provider's `enabled` flag.
    pub fn set_provider_enabled(&self, name: &str, enabled: bool) -> Result<ProviderConfig> {
        let provider = self.get_provider(name)?;
        self.update_provider(ProviderConfig { enabled, ..provider })
    }

    /// Insert or replace a model. Its provider must already exist.
    pub fn update_model(&self, model: ModelConfig) -> Result<ModelConfig> {
        self.commit(|doc| {
            let mut changes = Vec::new();
            if let Some(previous) = doc.models.get(&model.name)
                && previous.caching.enabled
                && !model.caching.enabled
            {
                changes.push(ConfigChange::ModelCachingDisabled(model.name.clone()));
            }
            doc.insert_model(model.clone());
            Ok((model, changes))
        })
    }

    /// Remove a model. Fails if a provider still names it as default.
    pub fn remove_model(&self, name: &str) -> Result<ModelConfig> {
        self.commit(|doc| {
            let removed = doc
                .models
                .remove(name)
                .ok_or_else(|| not_found(EntityKind::Model, name))?;
            Ok((removed, vec![ConfigChange::ModelRemoved(name.to_string())]))
        })
    }

    pub fn update_policy(&self, policy: SystemPolicy) -> Result<SystemPolicy> {
        self.commit(|doc| {
            doc.system = policy.clone();
            Ok((policy, Vec::new()))
        })
    }

    pub fn update_global_caching(&self, caching: GlobalCaching) -> Result<GlobalCaching> {
        self.commit(|doc| {
            doc.global_caching = caching;
            Ok((caching, vec![ConfigChange::GlobalCachingChanged]))
        })
    }

    /// Replace everything with [`ConfigDocument::default`].
    pub fn reset_to_defaults(&self) -> Result<ConfigDocument> {
        self.replace(ConfigDocument::default())
    }

    /// Replace the whole document (e.g. a dashboard import).
    pub fn replace(&self, doc: ConfigDocument) -> Result<ConfigDocument> {
        self.commit(|current| {
            *current = doc;
            current.normalize();
            Ok((current.clone(), vec![ConfigChange::Replaced]))
        })
    }

    /// Re-read the backing file, picking up out-of-band edits.
    pub fn reload(&self) -> Result<ConfigDocument> {
        let path = self
            .path
            .as_deref()
            .ok_or_else(|| HermodError::Configuration("store has no backing file".into()))?;
        let doc = read_document(path)?;
        self.replace(doc)
    }

    fn commit<T>(
        &self,
        apply: impl FnOnce(&mut ConfigDocument) -> Result<(T, Vec<ConfigChange>)>,
    ) -> Result<T> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = (*self.snapshot()).clone();
        let (value, changes) = apply(&mut next)?;
        next.validate()?;

        let next = Arc::new(next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&next);
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        info!(version, changes = changes.len(), "configuration committed");

        let observers: Vec<Arc<dyn ConfigObserver>> = {
            let mut registered = self.observers.write().unwrap_or_else(PoisonError::into_inner);
            registered.retain(|o| o.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };
        for change in &changes {
            for observer in &observers {
                observer.on_change(change, &next);
            }
        }

        self.persist(&next)?;
        Ok(value)
    }

    fn persist(&self, doc: &ConfigDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = doc.to_json()?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, path))
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "configuration not persisted");
                HermodError::Persistence(format!("{}: {e}", path.display()))
            })
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("version", &self.version())
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn read_document(path: &Path) -> Result<ConfigDocument> {
    let content = fs::read_to_string(path).map_err(|e| {
        HermodError::Configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    ConfigDocument::from_json(&content)
}

fn not_found(kind: EntityKind, name: &str) -> HermodError {
    HermodError::NotFound {
        kind,
        name: name.to_string(),
    }
}
