//! Typed configuration document and its validation rules.
//!
//! The persisted layout has four top-level sections:
//!
//! ```json
//! {
//!   "global_caching": { "enabled": true, "threshold": 0.85, ... },
//!   "providers": { "runpod": { "enabled": true, "priority": 1, ... } },
//!   "models": { "llama-3-8b": { "provider": "runpod", "max_tokens": 256, ... } },
//!   "system": { "default_provider": "runpod", "fallback_provider": "openrouter", ... }
//! }
//! ```
//!
//! Map keys are authoritative for names: [`ConfigDocument::normalize`]
//! copies each key into the entry's `name` field after deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{HermodError, Result};

/// Per-provider or per-model caching override.
///
/// `threshold: None` inherits the next level up (model → provider → global).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachingPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

impl Default for CachingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: None,
        }
    }
}

impl CachingPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: None,
        }
    }

    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            enabled: true,
            threshold: Some(threshold),
        }
    }
}

/// Cache-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalCaching {
    pub enabled: bool,
    /// Similarity threshold used when no model/provider threshold is set.
    pub threshold: f32,
    /// Capacity of the response cache.
    pub max_responses: usize,
    /// Entries older than this are never served.
    pub max_cache_age_hours: u64,
}

impl Default for GlobalCaching {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            max_responses: 1_000,
            max_cache_age_hours: 24,
        }
    }
}

/// A backend provider entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    /// Lower is tried first among the non-policy candidates.
    pub priority: i32,
    /// Opaque reference the runtime resolves to an address and credential.
    #[serde(default)]
    pub endpoint_ref: String,
    #[serde(default)]
    pub caching: CachingPolicy,
    /// Model used when the request's hint does not target this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Hard per-call timeout override, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        let name = name.into();
        Self {
            endpoint_ref: name.clone(),
            name,
            enabled: true,
            priority,
            caching: CachingPolicy::default(),
            default_model: None,
            timeout_secs: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn endpoint_ref(mut self, endpoint_ref: impl Into<String>) -> Self {
        self.endpoint_ref = endpoint_ref.into();
        self
    }

    pub fn caching(mut self, caching: CachingPolicy) -> Self {
        self.caching = caching;
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// A model served by exactly one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub name: String,
    pub provider: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub caching: CachingPolicy,
}

impl ModelConfig {
    pub fn new(name: impl Into<String>, provider: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            max_tokens,
            caching: CachingPolicy::default(),
        }
    }

    pub fn caching(mut self, caching: CachingPolicy) -> Self {
        self.caching = caching;
        self
    }
}

/// Default/fallback provider choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPolicy {
    pub default_provider: String,
    pub fallback_provider: String,
    pub fallback_enabled: bool,
    /// When false, the router tries only its first candidate.
    #[serde(default = "default_true")]
    pub auto_switch: bool,
}

impl SystemPolicy {
    pub fn new(default_provider: impl Into<String>, fallback_provider: impl Into<String>) -> Self {
        Self {
            default_provider: default_provider.into(),
            fallback_provider: fallback_provider.into(),
            fallback_enabled: true,
            auto_switch: true,
        }
    }
}

/// The full configuration, as persisted and exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub global_caching: GlobalCaching,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    pub system: SystemPolicy,
}

impl Default for ConfigDocument {
    /// Three reference backends: a serverless GPU endpoint as the default,
    /// a hosted gateway as fallback, and a local inference server that
    /// starts disabled.
    fn default() -> Self {
        let mut doc = Self {
            global_caching: GlobalCaching::default(),
            providers: BTreeMap::new(),
            models: BTreeMap::new(),
            system: SystemPolicy::new("runpod", "openrouter"),
        };
        doc.insert_provider(ProviderConfig::new("runpod", 1).default_model("llama-3-8b-instruct"));
        doc.insert_provider(
            ProviderConfig::new("openrouter", 2).default_model("openai/gpt-4o-mini"),
        );
        doc.insert_provider(
            ProviderConfig::new("ollama", 3)
                .enabled(false)
                .default_model("llama3"),
        );
        doc.insert_model(ModelConfig::new("llama-3-8b-instruct", "runpod", 256));
        doc.insert_model(ModelConfig::new("openai/gpt-4o-mini", "openrouter", 256));
        doc.insert_model(ModelConfig::new("llama3", "ollama", 256));
        doc
    }
}

impl ConfigDocument {
    /// Empty document with the given policy. Mostly useful in tests.
    pub fn empty(system: SystemPolicy) -> Self {
        Self {
            global_caching: GlobalCaching::default(),
            providers: BTreeMap::new(),
            models: BTreeMap::new(),
            system,
        }
    }

    pub fn insert_provider(&mut self, provider: ProviderConfig) {
        self.providers.insert(provider.name.clone(), provider);
    }

    pub fn insert_model(&mut self, model: ModelConfig) {
        self.models.insert(model.name.clone(), model);
    }

    /// Parse a persisted JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut doc: ConfigDocument = serde_json::from_str(json)?;
        doc.normalize();
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Make each entry's `name` match its map key.
    pub fn normalize(&mut self) {
        for (key, provider) in &mut self.providers {
            provider.name.clone_from(key);
            if provider.endpoint_ref.is_empty() {
                provider.endpoint_ref.clone_from(key);
            }
        }
        for (key, model) in &mut self.models {
            model.name.clone_from(key);
        }
    }

    pub fn is_enabled(&self, provider: &str) -> bool {
        self.providers.get(provider).is_some_and(|p| p.enabled)
    }

    /// Enabled providers ordered by priority, name as tie-break.
    pub fn enabled_by_priority(&self) -> Vec<&ProviderConfig> {
        let mut enabled: Vec<_> = self.providers.values().filter(|p| p.enabled).collect();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        enabled
    }

    /// Model a provider is invoked with when no hint targets it: its
    /// `default_model`, else its first model by name.
    pub fn model_for_provider(&self, provider: &str) -> Option<&ModelConfig> {
        let configured = self
            .providers
            .get(provider)
            .and_then(|p| p.default_model.as_deref())
            .and_then(|name| self.models.get(name));
        configured.or_else(|| self.models.values().find(|m| m.provider == provider))
    }

    /// Threshold for a model/provider pair, falling back to global.
    pub fn resolve_threshold(&self, model: Option<&str>, provider: Option<&str>) -> f32 {
        let from_model = model
            .and_then(|m| self.models.get(m))
            .and_then(|m| m.caching.threshold);
        let from_provider = provider
            .and_then(|p| self.providers.get(p))
            .and_then(|p| p.caching.threshold);
        from_model
            .or(from_provider)
            .unwrap_or(self.global_caching.threshold)
    }

    /// Whether caching applies to a model/provider pair. Every level that
    /// is present must allow it.
    pub fn caching_enabled(&self, model: Option<&str>, provider: Option<&str>) -> bool {
        let model_ok = model
            .and_then(|m| self.models.get(m))
            .is_none_or(|m| m.caching.enabled);
        let provider_ok = provider
            .and_then(|p| self.providers.get(p))
            .is_none_or(|p| p.caching.enabled);
        self.global_caching.enabled && model_ok && provider_ok
    }

    /// Check every invariant of the document.
    pub fn validate(&self) -> Result<()> {
        let gc = &self.global_caching;
        check_threshold("global_caching.threshold", Some(gc.threshold))?;
        if gc.max_responses == 0 {
            return Err(invalid("global_caching.max_responses must be greater than 0"));
        }
        if gc.max_cache_age_hours == 0 {
            return Err(invalid(
                "global_caching.max_cache_age_hours must be greater than 0",
            ));
        }

        for (key, provider) in &self.providers {
            if key.is_empty() {
                return Err(invalid("provider name must not be empty"));
            }
            if key != &provider.name {
                return Err(invalid(format!(
                    "provider key '{key}' does not match name '{}'",
                    provider.name
                )));
            }
            check_threshold(
                &format!("providers.{key}.caching.threshold"),
                provider.caching.threshold,
            )?;
            if provider.timeout_secs == Some(0) {
                return Err(invalid(format!(
                    "providers.{key}.timeout_secs must be greater than 0"
                )));
            }
            if let Some(model_name) = &provider.default_model {
                match self.models.get(model_name) {
                    Some(model) if &model.provider == key => {}
                    Some(model) => {
                        return Err(invalid(format!(
                            "provider '{key}' default_model '{model_name}' belongs to provider '{}'",
                            model.provider
                        )));
                    }
                    None => {
                        return Err(invalid(format!(
                            "provider '{key}' default_model '{model_name}' is not a configured model"
                        )));
                    }
                }
            }
        }

        for (key, model) in &self.models {
            if key.is_empty() {
                return Err(invalid("model name must not be empty"));
            }
            if key != &model.name {
                return Err(invalid(format!(
                    "model key '{key}' does not match name '{}'",
                    model.name
                )));
            }
            if !self.providers.contains_key(&model.provider) {
                return Err(invalid(format!(
                    "model '{key}' references unknown provider '{}'",
                    model.provider
                )));
            }
            if model.max_tokens == 0 {
                return Err(invalid(format!(
                    "model '{key}' max_tokens must be greater than 0"
                )));
            }
            check_threshold(
                &format!("models.{key}.caching.threshold"),
                model.caching.threshold,
            )?;
        }

        self.validate_policy()
    }

    fn validate_policy(&self) -> Result<()> {
        let policy = &self.system;
        for (role, name) in [
            ("default_provider", &policy.default_provider),
            ("fallback_provider", &policy.fallback_provider),
        ] {
            if !self.providers.contains_key(name) {
                return Err(invalid(format!(
                    "system.{role} '{name}' is not a configured provider"
                )));
            }
        }
        if !self.is_enabled(&policy.default_provider) && !policy.fallback_enabled {
            return Err(invalid(format!(
                "default provider '{}' is disabled and fallback is not enabled",
                policy.default_provider
            )));
        }
        Ok(())
    }
}

fn check_threshold(field: &str, threshold: Option<f32>) -> Result<()> {
    match threshold {
        Some(t) if !(0.0..=1.0).contains(&t) => Err(invalid(format!(
            "{field} must be within [0, 1], got {t}"
        ))),
        _ => Ok(()),
    }
}

fn invalid(message: impl Into<String>) -> HermodError {
    HermodError::Configuration(message.into())
}

fn default_true() -> bool {
    true
}
