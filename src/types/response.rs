//! Provider and router response types

use serde::{Deserialize, Serialize};

/// Raw completion returned by a provider adapter, before the truncation
/// check classifies it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub text: String,
    #[serde(default)]
    pub finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ProviderResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }

    pub fn completion_tokens(mut self, tokens: u32) -> Self {
        self.usage = Some(Usage {
            completion_tokens: tokens,
            ..self.usage.unwrap_or_default()
        });
        self
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Reason the backend stopped generating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    /// Backend hit its token limit.
    Length,
    /// Backend did not say.
    Unknown,
}

/// What the router hands back to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedResponse {
    pub text: String,
    pub provider_used: String,
    pub model_used: String,
    pub served_from_cache: bool,
    /// Similarity of the cached entry, for cache hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    /// Cache threshold applied to this request, when caching was consulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}
