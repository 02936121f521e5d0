//! Candidate selection.
//!
//! Turns a configuration snapshot and a request into the ordered list of
//! providers to try:
//!
//! ```text
//! [hinted model's provider] + [default] + [fallback] + [rest by priority]
//! ```
//!
//! Disabled providers never appear. Duplicates keep their first position.
//! Each candidate carries the model it will be invoked with and that model's
//! token limit, so dispatch never has to consult the configuration again.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ConfigDocument;
use crate::types::Request;
use crate::{HermodError, Result};

/// One provider to try, with everything needed to invoke it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    /// Provider-specific deadline, overriding the router default.
    pub timeout: Option<Duration>,
}

/// Ordered candidates for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub candidates: Vec<Candidate>,
    /// Whether a `model_hint` was present but could not be honored.
    pub hint_ignored: bool,
}

impl Selection {
    /// Candidate whose model/provider drive the cache policy for the request.
    pub fn primary(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

/// Build the candidate list for `request` against `doc`.
///
/// Errors:
/// - [`HermodError::NoEnabledProviders`] when every provider is disabled
/// - [`HermodError::Configuration`] when the default provider is unusable
///   and no enabled fallback can stand in, or when no enabled provider has
///   a model to invoke
pub fn select(doc: &ConfigDocument, request: &Request) -> Result<Selection> {
    let enabled = doc.enabled_by_priority();
    if enabled.is_empty() {
        return Err(HermodError::NoEnabledProviders);
    }

    let policy = &doc.system;
    let default_ok = doc.is_enabled(&policy.default_provider);
    let fallback_ok = policy.fallback_enabled && doc.is_enabled(&policy.fallback_provider);
    if !default_ok && !fallback_ok {
        return Err(HermodError::Configuration(format!(
            "default provider '{}' is disabled and no enabled fallback is available (fallback '{}', fallback_enabled={})",
            policy.default_provider, policy.fallback_provider, policy.fallback_enabled
        )));
    }

    let mut candidates: Vec<Candidate> = Vec::with_capacity(enabled.len());
    let mut hint_ignored = false;

    if let Some(hint) = request.model_hint.as_deref() {
        match doc.models.get(hint) {
            Some(model) if doc.is_enabled(&model.provider) => {
                candidates.push(Candidate {
                    provider: model.provider.clone(),
                    model: model.name.clone(),
                    max_tokens: model.max_tokens,
                    timeout: provider_timeout(doc, &model.provider),
                });
            }
            Some(model) => {
                debug!(hint, provider = %model.provider, "ignoring model hint: provider disabled");
                hint_ignored = true;
            }
            None => {
                debug!(hint, "ignoring model hint: unknown model");
                hint_ignored = true;
            }
        }
    }

    let mut order: Vec<&str> = Vec::with_capacity(enabled.len() + 2);
    if default_ok {
        order.push(&policy.default_provider);
    }
    if fallback_ok {
        order.push(&policy.fallback_provider);
    }
    order.extend(enabled.iter().map(|p| p.name.as_str()));

    for provider in order {
        if candidates.iter().any(|c| c.provider == provider) {
            continue;
        }
        let Some(model) = doc.model_for_provider(provider) else {
            warn!(provider, "enabled provider has no configured model, skipping");
            continue;
        };
        candidates.push(Candidate {
            provider: provider.to_string(),
            model: model.name.clone(),
            max_tokens: model.max_tokens,
            timeout: provider_timeout(doc, provider),
        });
    }

    if candidates.is_empty() {
        return Err(HermodError::Configuration(
            "no enabled provider has a configured model".into(),
        ));
    }

    Ok(Selection {
        candidates,
        hint_ignored,
    })
}

fn provider_timeout(doc: &ConfigDocument, provider: &str) -> Option<Duration> {
    doc.providers
        .get(provider)
        .and_then(|p| p.timeout_secs)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, ProviderConfig, SystemPolicy};

    /// p1 (priority 3), p2 (priority 1), p3 (priority 2); default p1,
    /// fallback p3.
    fn doc() -> ConfigDocument {
        let mut doc = ConfigDocument::empty(SystemPolicy::new("p1", "p3"));
        doc.insert_provider(ProviderConfig::new("p1", 3).default_model("m1"));
        doc.insert_provider(ProviderConfig::new("p2", 1).timeout_secs(7));
        doc.insert_provider(ProviderConfig::new("p3", 2));
        doc.insert_model(ModelConfig::new("m1", "p1", 100));
        doc.insert_model(ModelConfig::new("m2", "p2", 200));
        doc.insert_model(ModelConfig::new("m3", "p3", 300));
        doc.insert_model(ModelConfig::new("m1-large", "p1", 900));
        doc
    }

    fn providers(selection: &Selection) -> Vec<&str> {
        selection
            .candidates
            .iter()
            .map(|c| c.provider.as_str())
            .collect()
    }

    #[test]
    fn default_then_fallback_then_priority() {
        let selection = select(&doc(), &Request::new("hi")).unwrap();
        assert_eq!(providers(&selection), ["p1", "p3", "p2"]);
        assert_eq!(selection.candidates[0].model, "m1");
        assert_eq!(selection.candidates[2].timeout, Some(Duration::from_secs(7)));
    }

    #[test]
    fn hint_goes_first_with_its_own_model() {
        let selection = select(&doc(), &Request::new("hi").model_hint("m1-large")).unwrap();
        assert_eq!(providers(&selection), ["p1", "p3", "p2"]);
        assert_eq!(selection.candidates[0].model, "m1-large");
        assert_eq!(selection.candidates[0].max_tokens, 900);

        let selection = select(&doc(), &Request::new("hi").model_hint("m2")).unwrap();
        assert_eq!(providers(&selection), ["p2", "p1", "p3"]);
    }

    #[test]
    fn hint_for_disabled_provider_is_ignored() {
        let mut doc = doc();
        doc.providers.get_mut("p2").unwrap().enabled = false;
        let selection = select(&doc, &Request::new("hi").model_hint("m2")).unwrap();
        assert!(selection.hint_ignored);
        assert_eq!(providers(&selection), ["p1", "p3"]);
    }

    #[test]
    fn unknown_hint_is_ignored() {
        let selection = select(&doc(), &Request::new("hi").model_hint("nope")).unwrap();
        assert!(selection.hint_ignored);
        assert_eq!(providers(&selection)[0], "p1");
    }

    #[test]
    fn disabled_default_uses_fallback() {
        let mut doc = doc();
        doc.providers.get_mut("p1").unwrap().enabled = false;
        let selection = select(&doc, &Request::new("hi")).unwrap();
        assert_eq!(providers(&selection), ["p3", "p2"]);
    }

    #[test]
    fn fallback_not_listed_when_fallback_disabled_in_policy() {
        let mut doc = doc();
        doc.system.fallback_enabled = false;
        let selection = select(&doc, &Request::new("hi")).unwrap();
        // p3 still appears, but only in priority order
        assert_eq!(providers(&selection), ["p1", "p2", "p3"]);
    }

    #[test]
    fn unsatisfiable_policy_is_a_configuration_error() {
        let mut doc = doc();
        doc.providers.get_mut("p1").unwrap().enabled = false;
        doc.providers.get_mut("p3").unwrap().enabled = false;
        let err = select(&doc, &Request::new("hi")).unwrap_err();
        assert!(matches!(err, HermodError::Configuration(_)));
    }

    #[test]
    fn nothing_enabled() {
        let mut doc = doc();
        for provider in doc.providers.values_mut() {
            provider.enabled = false;
        }
        let err = select(&doc, &Request::new("hi")).unwrap_err();
        assert!(matches!(err, HermodError::NoEnabledProviders));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn provider_without_model_is_skipped() {
        let mut doc = doc();
        doc.insert_provider(ProviderConfig::new("bare", 0));
        let selection = select(&doc, &Request::new("hi")).unwrap();
        assert!(!providers(&selection).contains(&"bare"));
    }
}
