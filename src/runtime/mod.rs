//! Process bootstrap: turn a [`RuntimeConfig`], [`Secrets`] and the policy
//! store into a ready [`Router`].
//!
//! Each provider in the policy document names an `endpoint_ref`; the
//! runtime config says what kind of backend that reference is and how to
//! reach it. Adapters are registered under the provider's name.

pub mod config;

pub use config::{EndpointConfig, RuntimeConfig, Secrets};

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ConfigStore;
use crate::providers::{GatewayAdapter, LocalAdapter, ProviderAdapter, ServerlessAdapter};
use crate::similarity::{HashingEmbedder, SharedEmbedder};
use crate::{Result, Router};

/// Open the policy document named by `runtime` (creating it with defaults
/// on first run).
pub fn open_store(runtime: &RuntimeConfig) -> Result<Arc<ConfigStore>> {
    Ok(Arc::new(ConfigStore::open(runtime.policy_path())?))
}

/// Build a router for every provider the policy document knows about.
///
/// Providers whose endpoint is not configured, or whose endpoint needs an
/// API key that is missing, are skipped with a warning. The router treats
/// them like any other provider without an adapter.
pub fn build_router(
    runtime: &RuntimeConfig,
    secrets: &Secrets,
    store: Arc<ConfigStore>,
) -> Result<Router> {
    let doc = store.snapshot();

    let mut builder = Router::builder(store.clone())
        .embedder_arc(build_embedder(runtime)?)
        .retry(runtime.retry.to_retry_config())
        .candidate_timeout(Duration::from_secs(runtime.router.candidate_timeout_secs))
        .health_ttl(Duration::from_secs(runtime.router.health_ttl_secs))
        .min_cache_quality(runtime.router.min_cache_quality);

    if let Some(secs) = runtime.router.cache_sweep_secs {
        builder = builder.cache_sweep_interval(Duration::from_secs(secs));
    }

    for provider in doc.providers.values() {
        let Some(endpoint) = runtime.endpoints.get(&provider.endpoint_ref) else {
            warn!(
                provider = %provider.name,
                endpoint_ref = %provider.endpoint_ref,
                "no endpoint configured, skipping provider"
            );
            continue;
        };
        match build_adapter(&provider.name, &provider.endpoint_ref, endpoint, secrets)? {
            Some(adapter) => {
                info!(provider = %provider.name, kind = endpoint.kind(), "adapter registered");
                builder = builder.adapter_arc(adapter);
            }
            None => warn!(
                provider = %provider.name,
                endpoint_ref = %provider.endpoint_ref,
                "no API key available, skipping provider"
            ),
        }
    }

    builder.build()
}

/// Construct one adapter. `Ok(None)` means a required API key is missing.
fn build_adapter(
    name: &str,
    endpoint_ref: &str,
    endpoint: &EndpointConfig,
    secrets: &Secrets,
) -> Result<Option<Arc<dyn ProviderAdapter>>> {
    let adapter: Arc<dyn ProviderAdapter> = match endpoint {
        EndpointConfig::Serverless {
            endpoint_id,
            base_url,
            timeout_secs,
        } => {
            let Some(key) = secrets.api_key(endpoint_ref, endpoint.kind()) else {
                return Ok(None);
            };
            let mut adapter = ServerlessAdapter::new(name, endpoint_id.clone(), key)?;
            if let Some(url) = base_url {
                adapter = adapter.base_url(url.clone());
            }
            if let Some(secs) = timeout_secs {
                adapter = adapter.timeout(Duration::from_secs(*secs));
            }
            Arc::new(adapter)
        }
        EndpointConfig::Gateway {
            base_url,
            system_prompt,
            timeout_secs,
        } => {
            let Some(key) = secrets.api_key(endpoint_ref, endpoint.kind()) else {
                return Ok(None);
            };
            let mut adapter = GatewayAdapter::new(name, key)?;
            if let Some(url) = base_url {
                adapter = adapter.base_url(url.clone());
            }
            if let Some(prompt) = system_prompt {
                adapter = adapter.system_prompt(prompt.clone());
            }
            if let Some(secs) = timeout_secs {
                adapter = adapter.timeout(Duration::from_secs(*secs));
            }
            Arc::new(adapter)
        }
        EndpointConfig::Local {
            base_url,
            system_prompt,
            timeout_secs,
        } => {
            let mut adapter = LocalAdapter::new(name)?;
            if let Some(url) = base_url {
                adapter = adapter.base_url(url.clone());
            }
            if let Some(prompt) = system_prompt {
                adapter = adapter.system_prompt(prompt.clone());
            }
            if let Some(secs) = timeout_secs {
                adapter = adapter.timeout(Duration::from_secs(*secs));
            }
            Arc::new(adapter)
        }
    };
    Ok(Some(adapter))
}

fn build_embedder(runtime: &RuntimeConfig) -> Result<SharedEmbedder> {
    match runtime.embedding.local_model.as_deref() {
        None => Ok(Arc::new(HashingEmbedder::new(runtime.embedding.dimensions)?)),
        #[cfg(feature = "local-inference")]
        Some(name) => {
            use crate::similarity::{FastEmbedEmbedder, LocalEmbeddingModel};

            let kind = match name.to_ascii_lowercase().as_str() {
                "all-minilm-l6-v2" => LocalEmbeddingModel::AllMiniLmL6V2,
                "bge-small-en" => LocalEmbeddingModel::BgeSmallEn,
                other => {
                    return Err(crate::HermodError::Configuration(format!(
                        "unknown local embedding model: {other}"
                    )));
                }
            };
            Ok(Arc::new(FastEmbedEmbedder::new(kind)?))
        }
        #[cfg(not(feature = "local-inference"))]
        Some(name) => Err(crate::HermodError::Configuration(format!(
            "local embedding model {name} requires the local-inference feature"
        ))),
    }
}
