//! Hosted multi-model gateway adapter (OpenAI-compatible, e.g. OpenRouter).
//!
//! `POST {base}/chat/completions` with a bearer key. `finish_reason` and
//! `usage.completion_tokens` are mapped onto [`ProviderResponse`] so the
//! truncation check sees exactly what the gateway reported.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{self, DEFAULT_REQUEST_TIMEOUT};
use super::traits::{AdapterResult, ProviderAdapter};
use crate::Result;
use crate::types::{FinishReason, Health, ProviderFailure, ProviderResponse, Request, Usage};

/// Default base URL for OpenRouter.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Adapter for an OpenAI-compatible chat completions gateway.
#[derive(Clone)]
pub struct GatewayAdapter {
    name: String,
    api_key: String,
    base_url: String,
    system_prompt: Option<String>,
    timeout: Duration,
    http: Client,
}

impl GatewayAdapter {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system_prompt: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http: http::build_client()?,
        })
    }

    /// Point at a different gateway (for testing with wiremock).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = http::trim_base(base_url);
        self
    }

    /// Prepend a system message to every request.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ProviderAdapter for GatewayAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &Request,
        model: &str,
        max_tokens: u32,
    ) -> AdapterResult<ProviderResponse> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.text,
        });

        let body = ChatRequest {
            model,
            messages,
            max_tokens,
            user: request.conversation_id.as_deref(),
        };
        let completion: ChatCompletion = http::send_json(
            &self.name,
            self.http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body),
        )
        .await?;

        // Gateways sometimes report upstream errors inside a 200 body.
        if let Some(error) = completion.error {
            return Err(ProviderFailure::unavailable(format!(
                "{}: {}",
                self.name, error.message
            )));
        }

        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            ProviderFailure::unavailable(format!("{}: response had no choices", self.name))
        })?;

        Ok(ProviderResponse {
            text: choice.message.content.unwrap_or_default(),
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("stop") => FinishReason::Stop,
                _ => FinishReason::Unknown,
            },
            usage: completion.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }

    async fn health(&self) -> Health {
        http::probe(
            self.http
                .get(format!("{}/models", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(self.timeout),
        )
        .await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
    #[serde(default)]
    error: Option<GatewayError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct GatewayError {
    message: String,
}
