//! Engine YAML configuration with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::chunker::DEFAULT_CHUNK_CAP;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum children per bulk link write.
    pub chunk_cap: usize,
    /// Concurrent bulk writes per operation bucket.
    pub dispatch_concurrency: usize,
    /// Id-resolution cache entry lifetime.
    pub cache_ttl_ms: u64,
    pub remote: RemoteConfig,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
}

/// Admin service endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
}

/// Consumer-group settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub group: String,
    /// How long an unacknowledged message stays with its first reader
    /// before another consumer may claim it.
    pub stale_after_ms: u64,
}

/// Identity store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_cap: DEFAULT_CHUNK_CAP,
            dispatch_concurrency: 4,
            cache_ttl_ms: 30_000,
            remote: RemoteConfig::default(),
            broker: BrokerConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".into(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            group: "onboard".into(),
            stale_after_ms: 60_000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "rosterline.db".into(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.timeout_ms)
    }

    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.broker.stale_after_ms)
    }
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut errors = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => {
                errors.push(var_name.to_string());
            }
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", errors.join(", "));
    }

    Ok(result)
}

/// Parse an engine config YAML string (after env var substitution).
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml_str: &str) -> Result<EngineConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: EngineConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse engine config YAML")?;
    if config.chunk_cap == 0 {
        anyhow::bail!("chunk_cap must be at least 1");
    }
    if config.dispatch_concurrency == 0 {
        anyhow::bail!("dispatch_concurrency must be at least 1");
    }
    Ok(config)
}

/// Parse an engine config YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_config(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}
