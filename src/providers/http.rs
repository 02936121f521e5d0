//! Shared HTTP plumbing for the reqwest-based adapters.
//!
//! Status mapping (identical for every backend):
//!
//! | status | failure |
//! |---|---|
//! | 400, 404, 413, 422 and other 4xx | `RejectedInput` |
//! | 408, 504 | `Timeout` |
//! | 429, other 5xx | `Unavailable` |
//!
//! Transport errors map to `Timeout` when the client deadline fired and to
//! `Unavailable` otherwise (refused connection, DNS, reset).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::traits::AdapterResult;
use crate::types::{FailureKind, Health, ProviderFailure};
use crate::{HermodError, Result};

/// Default per-request deadline applied by adapters.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest error body excerpt carried into a failure detail.
const MAX_DETAIL_CHARS: usize = 200;

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| HermodError::Http(format!("failed to build HTTP client: {e}")))
}

/// Strip a trailing slash so paths can be appended with `format!`.
pub(crate) fn trim_base(base_url: impl Into<String>) -> String {
    let mut base = base_url.into();
    while base.ends_with('/') {
        base.pop();
    }
    base
}

pub(crate) fn failure_kind_for_status(status: StatusCode) -> FailureKind {
    match status.as_u16() {
        408 | 504 => FailureKind::Timeout,
        429 => FailureKind::Unavailable,
        code if (500..600).contains(&code) => FailureKind::Unavailable,
        _ => FailureKind::RejectedInput,
    }
}

pub(crate) fn send_failure(provider: &str, err: &reqwest::Error) -> ProviderFailure {
    if err.is_timeout() {
        ProviderFailure::timeout(format!("{provider}: request timed out"))
    } else {
        ProviderFailure::unavailable(format!("{provider}: {err}"))
    }
}

/// Turn a non-success response into a failure, keeping a short excerpt of
/// the body for logs.
pub(crate) async fn status_failure(provider: &str, response: reqwest::Response) -> ProviderFailure {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.trim().chars().take(MAX_DETAIL_CHARS).collect();
    let detail = if excerpt.is_empty() {
        format!("{provider}: HTTP {status}")
    } else {
        format!("{provider}: HTTP {status}: {excerpt}")
    };
    ProviderFailure::new(failure_kind_for_status(status), detail)
}

/// Send a prepared request and decode a JSON body, mapping every failure
/// path onto a [`ProviderFailure`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> AdapterResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| send_failure(provider, &e))?;
    if !response.status().is_success() {
        return Err(status_failure(provider, response).await);
    }
    response.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            send_failure(provider, &e)
        } else {
            ProviderFailure::unavailable(format!("{provider}: unexpected response body: {e}"))
        }
    })
}

/// Health from a plain GET probe: 2xx is healthy, throttling or a slow
/// gateway is degraded, anything else (including no answer) is down.
pub(crate) async fn probe(request: reqwest::RequestBuilder) -> Health {
    match request.send().await {
        Ok(response) if response.status().is_success() => Health::Healthy,
        Ok(response) => match response.status().as_u16() {
            429 | 503 | 504 => Health::Degraded,
            _ => Health::Down,
        },
        Err(_) => Health::Down,
    }
}
