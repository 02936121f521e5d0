//! Provider adapter trait.
//!
//! Each backend (serverless GPU endpoint, hosted gateway, local inference
//! server) implements [`ProviderAdapter`]. The router holds adapters as
//! `Arc<dyn ProviderAdapter>` keyed by provider name and never branches on
//! which backend it is talking to.
//!
//! # Failure semantics
//!
//! Adapters report every failure as a [`ProviderFailure`] with a
//! [`FailureKind`](crate::FailureKind). All kinds are recoverable from the
//! router's point of view: it logs the failure and moves to the next
//! candidate.
//!
//! # Example
//!
//! ```ignore
//! #[async_trait]
//! impl ProviderAdapter for MyBackend {
//!     fn name(&self) -> &str { "mine" }
//!
//!     async fn complete(&self, request: &Request, model: &str, max_tokens: u32)
//!         -> Result<ProviderResponse, ProviderFailure>
//!     {
//!         // call the backend, map its finish reason and token usage
//!     }
//!
//!     async fn health(&self) -> Health { Health::Healthy }
//! }
//! ```

use async_trait::async_trait;

use super::truncation;
use crate::types::{Health, ProviderFailure, ProviderResponse, Request};

/// Result type for adapter calls.
pub type AdapterResult<T> = std::result::Result<T, ProviderFailure>;

/// A backend capable of producing a model response.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Raw call to the backend.
    ///
    /// Implementations report what the backend said (text, finish reason,
    /// token usage) and leave truncation to [`invoke`](Self::invoke).
    async fn complete(
        &self,
        request: &Request,
        model: &str,
        max_tokens: u32,
    ) -> AdapterResult<ProviderResponse>;

    /// Self-reported health. `Down` lets the router skip this adapter
    /// without paying for a failed call.
    async fn health(&self) -> Health;

    /// [`complete`](Self::complete) followed by the deterministic
    /// truncation check. A truncated response becomes a `Truncated`
    /// failure instead of a success.
    async fn invoke(
        &self,
        request: &Request,
        model: &str,
        max_tokens: u32,
    ) -> AdapterResult<ProviderResponse> {
        let response = self.complete(request, model, max_tokens).await?;
        truncation::check(response, max_tokens)
    }
}
