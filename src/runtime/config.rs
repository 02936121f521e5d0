//! Runtime configuration for the `hermod` binary.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.hermod/config.toml` (user)
//! 3. `/etc/hermod/config.toml` (system)
//!
//! When no file exists the built-in defaults are used. The routing policy
//! itself lives in a separate JSON document (see [`ConfigStore`](crate::ConfigStore));
//! this file only says where that document is and how to reach each
//! endpoint.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.hermod/secrets.toml` (user, must be 0600)
//! 2. `/etc/hermod/secrets.toml` (system, must be 0600)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::providers::RetryConfig;
use crate::{HermodError, Result};

/// Runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    /// Routing policy document. Default: `~/.hermod/policy.json`.
    #[serde(default)]
    pub policy_path: Option<PathBuf>,
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    /// Adapter settings keyed by `endpoint_ref`.
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

/// Router timing and cache knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    /// Hard deadline per provider call in seconds (default: 30).
    #[serde(default = "default_candidate_timeout")]
    pub candidate_timeout_secs: u64,
    /// Health probe memo TTL in seconds (default: 10).
    #[serde(default = "default_health_ttl")]
    pub health_ttl_secs: u64,
    /// Responses scoring at or below this are not cached (default: 0.0).
    #[serde(default)]
    pub min_cache_quality: f32,
    /// Eager cache sweep interval in seconds. Unset: lazy purge only.
    #[serde(default)]
    pub cache_sweep_secs: Option<u64>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            candidate_timeout_secs: default_candidate_timeout(),
            health_ttl_secs: default_health_ttl(),
            min_cache_quality: 0.0,
            cache_sweep_secs: None,
        }
    }
}

fn default_candidate_timeout() -> u64 {
    30
}

fn default_health_ttl() -> u64 {
    10
}

/// Retry policy applied to every adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Attempts including the first; 1 disables retries (default: 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

/// Fingerprint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    /// Hashing embedder dimensions (default: 384).
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Use a local neural model instead of the hashing embedder:
    /// "all-minilm-l6-v2" or "bge-small-en". Requires `local-inference`.
    #[serde(default)]
    pub local_model: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            local_model: None,
        }
    }
}

fn default_dimensions() -> usize {
    crate::similarity::hashing::DEFAULT_DIMENSIONS
}

/// How to reach one backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// Serverless GPU endpoint (RunPod-style).
    Serverless {
        endpoint_id: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    /// OpenAI-compatible gateway (OpenRouter-style).
    Gateway {
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    /// Local inference server (Ollama-style).
    Local {
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        system_prompt: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl EndpointConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            EndpointConfig::Serverless { .. } => "serverless",
            EndpointConfig::Gateway { .. } => "gateway",
            EndpointConfig::Local { .. } => "local",
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.hermod/config.toml`
    /// 3. `/etc/hermod/config.toml`
    /// 4. built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("no runtime config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HermodError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content)
            .map_err(|e| HermodError::Configuration(format!("in {path:?}: {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HermodError::Configuration(format!("failed to parse config: {e}")))
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HermodError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(dir) = user_dir() {
            let user_config = dir.join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/hermod/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Where the routing policy document lives.
    pub fn policy_path(&self) -> PathBuf {
        self.policy_path.clone().unwrap_or_else(|| {
            user_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("policy.json")
        })
    }
}

fn user_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hermod"))
}

// ============================================================================
// Secrets
// ============================================================================

/// Secrets configuration (API keys), keyed by `endpoint_ref`.
///
/// ```toml
/// [runpod]
/// api_key = "rp_..."
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secrets {
    entries: BTreeMap<String, ApiKeySecret>,
}

/// A single API key secret.
#[derive(Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl std::fmt::Debug for ApiKeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKeySecret(..)")
    }
}

/// Well-known environment variables per endpoint kind.
const KIND_ENV_VARS: &[(&str, &str)] = &[
    ("serverless", "RUNPOD_API_KEY"),
    ("gateway", "OPENROUTER_API_KEY"),
];

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (keys may come from env vars).
    pub fn load() -> Result<Self> {
        if let Some(dir) = user_dir() {
            let user_secrets = dir.join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/hermod/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file, refusing it if group/other can read it.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            HermodError::Configuration(format!("failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HermodError::Configuration(format!("failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// API key for an endpoint: the secrets file first, then
    /// `HERMOD_<ENDPOINT_REF>_API_KEY`, then the kind's well-known variable
    /// (`RUNPOD_API_KEY`, `OPENROUTER_API_KEY`).
    pub fn api_key(&self, endpoint_ref: &str, kind: &str) -> Option<String> {
        self.entries
            .get(endpoint_ref)
            .map(|s| s.api_key.clone())
            .or_else(|| std::env::var(endpoint_env_var(endpoint_ref)).ok())
            .or_else(|| {
                KIND_ENV_VARS
                    .iter()
                    .find(|(k, _)| *k == kind)
                    .and_then(|(_, var)| std::env::var(var).ok())
            })
    }
}

fn endpoint_env_var(endpoint_ref: &str) -> String {
    let upper: String = endpoint_ref
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("HERMOD_{upper}_API_KEY")
}

/// Check that the secrets file has secure permissions (0600 or 0400).
#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| {
        HermodError::Configuration(format!("failed to stat secrets file {path:?}: {e}"))
    })?;

    let mode = metadata.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(HermodError::Configuration(format!(
            "secrets file {path:?} has insecure permissions {:o}; must be 0600 or 0400",
            mode & 0o777
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.router.candidate_timeout_secs, 30);
        assert_eq!(config.router.health_ttl_secs, 10);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.embedding.dimensions, 384);
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn default_policy_path_is_under_home() {
        let path = RuntimeConfig::default().policy_path();
        assert!(path.ends_with("policy.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join(".hermod").join("policy.json"));
        }
    }

    #[test]
    fn parse_endpoints() {
        let config = RuntimeConfig::parse(
            r#"
            policy_path = "/var/lib/hermod/policy.json"

            [router]
            candidate_timeout_secs = 12
            cache_sweep_secs = 300

            [endpoints.runpod]
            kind = "serverless"
            endpoint_id = "abc123"

            [endpoints.openrouter]
            kind = "gateway"
            system_prompt = "You answer HVAC support calls."

            [endpoints.ollama]
            kind = "local"
            base_url = "http://gpu-box:11434"
            "#,
        )
        .unwrap();

        assert_eq!(config.policy_path(), PathBuf::from("/var/lib/hermod/policy.json"));
        assert_eq!(config.router.candidate_timeout_secs, 12);
        assert_eq!(config.router.health_ttl_secs, 10);
        assert_eq!(config.router.cache_sweep_secs, Some(300));
        assert_eq!(config.endpoints.len(), 3);
        assert_eq!(
            config.endpoints["runpod"],
            EndpointConfig::Serverless {
                endpoint_id: "abc123".into(),
                base_url: None,
                timeout_secs: None,
            }
        );
        assert_eq!(config.endpoints["ollama"].kind(), "local");
    }

    #[test]
    fn unknown_endpoint_kind_is_rejected() {
        let err = RuntimeConfig::parse(
            r#"
            [endpoints.x]
            kind = "carrier-pigeon"
            "#,
        )
        .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        assert!(RuntimeConfig::load(Some(Path::new("/nonexistent/hermod.toml"))).is_err());
    }

    #[test]
    fn env_var_names() {
        assert_eq!(endpoint_env_var("runpod"), "HERMOD_RUNPOD_API_KEY");
        assert_eq!(endpoint_env_var("open-router.eu"), "HERMOD_OPEN_ROUTER_EU_API_KEY");
    }

    #[test]
    fn secrets_file_wins() {
        let secrets: Secrets = toml::from_str(
            r#"
            [runpod]
            api_key = "from-file"
            "#,
        )
        .unwrap();
        assert_eq!(
            secrets.api_key("runpod", "serverless").as_deref(),
            Some("from-file")
        );
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_are_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[runpod]\napi_key = \"k\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(Secrets::load_from_file(&path).is_err());

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(secrets.api_key("runpod", "serverless").as_deref(), Some("k"));
    }
}
