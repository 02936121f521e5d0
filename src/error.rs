//! Hermod error types

use std::fmt;

use crate::types::ProviderFailure;

/// Hermod error types
#[derive(Debug, thiserror::Error)]
pub enum HermodError {
    // Configuration errors
    /// Invalid or contradictory policy. Fatal to the request that hit it.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No provider is enabled, so there is nothing to route to.
    #[error("no enabled providers configured")]
    NoEnabledProviders,

    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },

    // Routing errors
    /// Every candidate provider was tried (or skipped as down) and none
    /// produced a usable response.
    #[error("all providers failed: {}", format_attempts(.attempts))]
    RoutingExhausted { attempts: Vec<Attempt> },

    /// A single adapter failure, as returned by direct adapter calls.
    #[error(transparent)]
    Provider(#[from] ProviderFailure),

    // Storage errors
    /// The in-memory value was applied but could not be written to disk.
    #[error("failed to persist configuration: {0}")]
    Persistence(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl HermodError {
    /// Whether this error reflects operator configuration rather than a
    /// runtime fault. `NoEnabledProviders` counts as configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            HermodError::Configuration(_) | HermodError::NoEnabledProviders
        )
    }

    /// Short, stable label for the error kind (used in logs and metrics).
    pub fn kind(&self) -> &'static str {
        match self {
            HermodError::Configuration(_) => "configuration",
            HermodError::NoEnabledProviders => "no_enabled_providers",
            HermodError::NotFound { .. } => "not_found",
            HermodError::RoutingExhausted { .. } => "routing_exhausted",
            HermodError::Provider(_) => "provider",
            HermodError::Persistence(_) => "persistence",
            HermodError::Json(_) => "json",
            HermodError::Embedding(_) => "embedding",
            HermodError::Http(_) => "http",
        }
    }
}

/// What a `NotFound` error was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Provider,
    Model,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Provider => f.write_str("provider"),
            EntityKind::Model => f.write_str("model"),
        }
    }
}

/// One candidate's outcome inside a `RoutingExhausted` error.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub provider: String,
    pub model: String,
    pub outcome: AttemptOutcome,
}

/// Why a candidate did not serve the request.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The adapter was invoked and failed.
    Failed(ProviderFailure),
    /// Health was `Down`; the adapter was not invoked.
    SkippedDown,
    /// No adapter is registered under the provider's name.
    NoAdapter,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Failed(failure) => {
                write!(f, "{}/{}: {}", self.provider, self.model, failure.kind)
            }
            AttemptOutcome::SkippedDown => write!(f, "{}/{}: down", self.provider, self.model),
            AttemptOutcome::NoAdapter => {
                write!(f, "{}/{}: no adapter", self.provider, self.model)
            }
        }
    }
}

fn format_attempts(attempts: &[Attempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for Hermod operations
pub type Result<T> = std::result::Result<T, HermodError>;
