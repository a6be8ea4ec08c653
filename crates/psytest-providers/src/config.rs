//! Configuration loading and generator factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use psytest_core::engine::EngineConfig;
use psytest_core::retry::RetryPolicy;
use psytest_core::traits::{TextGenerator, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE};

use crate::gemini::{GeminiGenerator, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};

/// Connection settings for the Gemini API.
///
/// Note: Custom Debug impl masks the API key to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let key = if self.api_key.is_empty() { "" } else { "***" };
        f.debug_struct("GeminiConfig")
            .field("api_key", &key)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Retry settings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            backoff_factor: default_backoff(),
            max_delay_ms: default_max_delay(),
            safety_margin_ms: default_safety_margin(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            safety_margin: Duration::from_millis(self.safety_margin_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Generate the personality interpretation instead of fixed descriptions.
    #[serde(default = "default_true")]
    pub personality_narrative: bool,
    /// Max concurrent sessions.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            personality_narrative: true,
            parallelism: default_parallelism(),
        }
    }
}

/// Top-level psytest configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsytestConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}
fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    5000
}
fn default_backoff() -> f64 {
    2.0
}
fn default_max_delay() -> u64 {
    60_000
}
fn default_safety_margin() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_parallelism() -> usize {
    4
}

impl PsytestConfig {
    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            retry: self.retry.policy(),
            personality_narrative: self.scoring.personality_narrative,
            parallelism: self.scoring.parallelism,
            temperature: self.gemini.temperature,
            max_output_tokens: self.gemini.max_output_tokens,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `psytest.toml` in the current directory
/// 2. `~/.config/psytest/config.toml`
///
/// Environment variable overrides: `GEMINI_API_KEY`, `PSYTEST_GEMINI_MODEL`.
pub fn load_config() -> Result<PsytestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<PsytestConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("psytest.toml");
            if local.exists() {
                Some(local)
            } else {
                config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => PsytestConfig::default(),
    };

    Ok(apply_env(config))
}

/// Parse a config string (useful for testing). `${VAR}` references are not
/// resolved here.
pub fn parse_config(content: &str) -> Result<PsytestConfig> {
    Ok(toml::from_str(content)?)
}

fn apply_env(mut config: PsytestConfig) -> PsytestConfig {
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        config.gemini.api_key = key;
    }
    if let Ok(model) = std::env::var("PSYTEST_GEMINI_MODEL") {
        config.gemini.model = model;
    }

    config.gemini.api_key = resolve_env_vars(&config.gemini.api_key);
    config.gemini.model = resolve_env_vars(&config.gemini.model);
    config.gemini.base_url = config.gemini.base_url.as_deref().map(resolve_env_vars);
    config
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("psytest"))
}

/// Create the text generator described by the configuration.
pub fn create_generator(config: &GeminiConfig) -> Arc<dyn TextGenerator> {
    if config.api_key.is_empty() {
        tracing::warn!("no Gemini API key configured; narrative generation will fail");
    }
    Arc::new(
        GeminiGenerator::new(&config.api_key, &config.model)
            .with_base_url(config.base_url.clone())
            .with_timeout_secs(config.timeout_secs),
    )
}
