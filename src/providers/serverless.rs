//! Serverless GPU endpoint adapter (RunPod-style `runsync` API).
//!
//! Requests go to `POST {base}/v2/{endpoint}/runsync`. Endpoints scale to
//! zero, so a job that is still `IN_QUEUE` or `IN_PROGRESS` when `runsync`
//! returns means the worker is cold-starting: that is reported as
//! `Unavailable` and the router moves on rather than waiting.
//!
//! Health comes from `GET {base}/v2/{endpoint}/health` worker counts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{self, DEFAULT_REQUEST_TIMEOUT};
use super::traits::{AdapterResult, ProviderAdapter};
use crate::Result;
use crate::types::{FinishReason, Health, ProviderFailure, ProviderResponse, Request, Usage};

/// Default base URL for the RunPod API.
pub const DEFAULT_BASE_URL: &str = "https://api.runpod.ai";

/// Adapter for a single serverless endpoint.
#[derive(Clone)]
pub struct ServerlessAdapter {
    name: String,
    endpoint_id: String,
    api_key: String,
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl ServerlessAdapter {
    pub fn new(
        name: impl Into<String>,
        endpoint_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            endpoint_id: endpoint_id.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            http: http::build_client()?,
        })
    }

    /// Point at a different API host (for testing with wiremock).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = http::trim_base(base_url);
        self
    }

    /// Per-request deadline, which also bounds how long `runsync` may block.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, action: &str) -> String {
        format!("{}/v2/{}/{}", self.base_url, self.endpoint_id, action)
    }
}

#[async_trait]
impl ProviderAdapter for ServerlessAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &Request,
        model: &str,
        max_tokens: u32,
    ) -> AdapterResult<ProviderResponse> {
        let body = RunRequest {
            input: RunInput {
                prompt: &request.text,
                model,
                sampling_params: SamplingParams { max_tokens },
            },
        };
        let job: RunResponse = http::send_json(
            &self.name,
            self.http
                .post(self.url("runsync"))
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body),
        )
        .await?;

        match job.status.as_str() {
            "COMPLETED" => {
                let output = job.output.ok_or_else(|| {
                    ProviderFailure::unavailable(format!("{}: completed job has no output", self.name))
                })?;
                Ok(output.into_response())
            }
            "IN_QUEUE" | "IN_PROGRESS" => {
                debug!(provider = %self.name, job = ?job.id, status = %job.status, "endpoint cold");
                Err(ProviderFailure::unavailable(format!(
                    "{}: job {} (endpoint cold-starting)",
                    self.name, job.status
                )))
            }
            "TIMED_OUT" => Err(ProviderFailure::timeout(format!(
                "{}: job timed out on the endpoint",
                self.name
            ))),
            other => Err(ProviderFailure::unavailable(format!(
                "{}: job {other}: {}",
                self.name,
                job.error.unwrap_or_default()
            ))),
        }
    }

    async fn health(&self) -> Health {
        let response = self
            .http
            .get(self.url("health"))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await;
        let Ok(response) = response else {
            return Health::Down;
        };
        if !response.status().is_success() {
            return Health::Down;
        }
        match response.json::<EndpointHealth>().await {
            Ok(report) => report.workers.health(),
            Err(_) => Health::Degraded,
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct RunRequest<'a> {
    input: RunInput<'a>,
}

#[derive(Serialize)]
struct RunInput<'a> {
    prompt: &'a str,
    model: &'a str,
    sampling_params: SamplingParams,
}

#[derive(Serialize)]
struct SamplingParams {
    max_tokens: u32,
}

#[derive(Deserialize)]
struct RunResponse {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<RunOutput>,
    #[serde(default)]
    error: Option<String>,
}

/// Worker output. vLLM workers return a list of chunks; simpler handlers
/// return a bare string or a `{text, ...}` object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RunOutput {
    Text(String),
    Chunks(Vec<VllmChunk>),
    Object {
        text: String,
        #[serde(default)]
        finish_reason: Option<String>,
        #[serde(default)]
        completion_tokens: Option<u32>,
    },
}

#[derive(Deserialize)]
struct VllmChunk {
    #[serde(default)]
    choices: Vec<VllmChoice>,
    #[serde(default)]
    usage: Option<VllmUsage>,
}

#[derive(Deserialize)]
struct VllmChoice {
    #[serde(default)]
    tokens: Vec<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct VllmUsage {
    #[serde(default)]
    input: u32,
    #[serde(default)]
    output: u32,
}

impl RunOutput {
    fn into_response(self) -> ProviderResponse {
        match self {
            RunOutput::Text(text) => ProviderResponse::new(text).finish_reason(FinishReason::Unknown),
            RunOutput::Object {
                text,
                finish_reason,
                completion_tokens,
            } => {
                let mut response =
                    ProviderResponse::new(text).finish_reason(map_finish_reason(finish_reason.as_deref()));
                if let Some(tokens) = completion_tokens {
                    response = response.completion_tokens(tokens);
                }
                response
            }
            RunOutput::Chunks(chunks) => {
                let mut text = String::new();
                let mut finish = None;
                let mut usage: Option<Usage> = None;
                for chunk in chunks {
                    for choice in chunk.choices {
                        match choice.text {
                            Some(t) => text.push_str(&t),
                            None => text.extend(choice.tokens),
                        }
                        finish = choice.finish_reason.or(finish);
                    }
                    if let Some(u) = chunk.usage {
                        let total = usage.get_or_insert_with(Usage::default);
                        total.prompt_tokens = total.prompt_tokens.max(u.input);
                        total.completion_tokens = total.completion_tokens.saturating_add(u.output);
                    }
                }
                ProviderResponse {
                    text,
                    finish_reason: map_finish_reason(finish.as_deref()),
                    usage,
                }
            }
        }
    }
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("stop") | Some("eos") => FinishReason::Stop,
        _ => FinishReason::Unknown,
    }
}

#[derive(Deserialize)]
struct EndpointHealth {
    #[serde(default)]
    workers: WorkerCounts,
}

#[derive(Deserialize, Default)]
struct WorkerCounts {
    #[serde(default)]
    idle: u32,
    #[serde(default)]
    running: u32,
    #[serde(default)]
    initializing: u32,
    #[serde(default)]
    throttled: u32,
    #[serde(default)]
    unhealthy: u32,
}

impl WorkerCounts {
    fn health(&self) -> Health {
        if self.idle.saturating_add(self.running) > 0 {
            Health::Healthy
        } else if self.unhealthy > 0 && self.initializing == 0 && self.throttled == 0 {
            Health::Down
        } else {
            // scaled to zero or warming up: a request will cold-start a worker
            Health::Degraded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ProviderResponse {
        serde_json::from_str::<RunOutput>(json)
            .unwrap()
            .into_response()
    }

    #[test]
    fn vllm_chunks_are_joined() {
        let response = parse(
            r#"[{"choices":[{"tokens":["Check ","the breaker."],"finish_reason":"stop"}],
                 "usage":{"input":7,"output":5}}]"#,
        );
        assert_eq!(response.text, "Check the breaker.");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.unwrap().completion_tokens, 5);
    }

    #[test]
    fn chunk_usage_saturates() {
        let response = parse(
            r#"[{"choices":[{"text":"a"}],"usage":{"output":4294967295}},
                {"choices":[{"text":"b"}],"usage":{"output":10}}]"#,
        );
        assert_eq!(response.text, "ab");
        assert_eq!(response.usage.unwrap().completion_tokens, u32::MAX);
    }

    #[test]
    fn bare_string_output() {
        let response = parse(r#""hello there.""#);
        assert_eq!(response.text, "hello there.");
        assert!(response.usage.is_none());
    }

    #[test]
    fn object_output() {
        let response = parse(r#"{"text":"cut","finish_reason":"length","completion_tokens":4}"#);
        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.usage.unwrap().completion_tokens, 4);
    }

    #[test]
    fn worker_counts_to_health() {
        let counts = |idle, initializing, unhealthy| WorkerCounts {
            idle,
            initializing,
            unhealthy,
            ..WorkerCounts::default()
        };
        assert_eq!(counts(1, 0, 0).health(), Health::Healthy);
        assert_eq!(counts(0, 1, 0).health(), Health::Degraded);
        assert_eq!(counts(0, 0, 0).health(), Health::Degraded);
        assert_eq!(counts(0, 0, 2).health(), Health::Down);
    }
}
