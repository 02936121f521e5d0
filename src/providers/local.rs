//! Local inference server adapter (Ollama-style).
//!
//! `POST {base}/api/generate` with `stream: false` and
//! `options.num_predict` set to the model's max_tokens. `done_reason` and
//! `eval_count` feed the truncation check.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{self, DEFAULT_REQUEST_TIMEOUT};
use super::traits::{AdapterResult, ProviderAdapter};
use crate::Result;
use crate::types::{FinishReason, Health, ProviderResponse, Request, Usage};

/// Default Ollama address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Adapter for a local Ollama server.
#[derive(Clone)]
pub struct LocalAdapter {
    name: String,
    base_url: String,
    system_prompt: Option<String>,
    timeout: Duration,
    http: Client,
}

impl LocalAdapter {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system_prompt: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http: http::build_client()?,
        })
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = http::trim_base(base_url);
        self
    }

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
impl ProviderAdapter for LocalAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &Request,
        model: &str,
        max_tokens: u32,
    ) -> AdapterResult<ProviderResponse> {
        let body = GenerateRequest {
            model,
            prompt: &request.text,
            system: self.system_prompt.as_deref(),
            stream: false,
            options: GenerateOptions {
                num_predict: max_tokens,
            },
        };
        let generated: GenerateResponse = http::send_json(
            &self.name,
            self.http
                .post(format!("{}/api/generate", self.base_url))
                .timeout(self.timeout)
                .json(&body),
        )
        .await?;

        let usage = generated.eval_count.map(|completion_tokens| Usage {
            prompt_tokens: generated.prompt_eval_count.unwrap_or(0),
            completion_tokens,
        });
        Ok(ProviderResponse {
            text: generated.response,
            finish_reason: match generated.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("stop") => FinishReason::Stop,
                _ => FinishReason::Unknown,
            },
            usage,
        })
    }

    async fn health(&self) -> Health {
        http::probe(
            self.http
                .get(format!("{}/api/tags", self.base_url))
                .timeout(self.timeout),
        )
        .await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}
