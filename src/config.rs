//! TOML configuration parsing.
//!
//! Every section carries defaults so that a missing or partial file still
//! produces a usable [`Config`]. See `config/argo.example.toml` for a
//! complete example.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Top-level configuration, one field per TOML section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the OpenAI-compatible chat completion service.
#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable that holds the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_low_temperature")]
    pub classify_temperature: f32,
    #[serde(default = "default_low_temperature")]
    pub query_temperature: f32,
    #[serde(default = "default_response_temperature")]
    pub response_temperature: f32,
    #[serde(default = "default_low_temperature")]
    pub agent_temperature: f32,
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: u32,
    #[serde(default = "default_max_agent_tokens")]
    pub max_agent_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_completion_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            classify_temperature: default_low_temperature(),
            query_temperature: default_low_temperature(),
            response_temperature: default_response_temperature(),
            agent_temperature: default_low_temperature(),
            max_response_tokens: default_max_response_tokens(),
            max_agent_tokens: default_max_agent_tokens(),
        }
    }
}

impl CompletionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Settings for the tool server that fronts the profile database and the
/// vector index.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl BackendConfig {
    /// Policy applied by the tool dispatcher to every backend call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// How a semantic record is folded into a structured record with the same id.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeOverlay {
    /// Copy only `similarity_score` and `context_note`.
    #[default]
    Similarity,
    /// Additionally fill fields the structured record left empty.
    FillMissing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_semantic_limit")]
    pub semantic_limit: u32,
    #[serde(default = "default_location_radius")]
    pub location_radius: f64,
    #[serde(default = "default_prompt_sample_size")]
    pub prompt_sample_size: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub merge_overlay: MergeOverlay,
    #[serde(default = "default_true")]
    pub concurrent_hybrid: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            semantic_limit: default_semantic_limit(),
            location_radius: default_location_radius(),
            prompt_sample_size: default_prompt_sample_size(),
            history_turns: default_history_turns(),
            merge_overlay: MergeOverlay::default(),
            concurrent_hybrid: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_completion_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_low_temperature() -> f32 {
    0.1
}
fn default_response_temperature() -> f32 {
    0.3
}
fn default_max_response_tokens() -> u32 {
    1000
}
fn default_max_agent_tokens() -> u32 {
    1500
}
fn default_backend_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_page_size() -> u32 {
    100
}
fn default_semantic_limit() -> u32 {
    10
}
fn default_location_radius() -> f64 {
    100.0
}
fn default_prompt_sample_size() -> usize {
    3
}
fn default_history_turns() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration with every default applied. Used when no config file
    /// exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load and validate a TOML configuration file.
///
/// # Arguments
///
/// * `path` - Path to the TOML file. Missing sections and keys take their
///   defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML for
/// [`Config`], or fails [`validate`].
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to
/// [`Config::minimal`].
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

/// Check value ranges that serde cannot express.
///
/// # Errors
///
/// Returns an error naming the first offending `section.key`.
pub fn validate(config: &Config) -> Result<()> {
    let c = &config.completion;
    if c.max_attempts == 0 {
        anyhow::bail!("completion.max_attempts must be >= 1");
    }
    if c.timeout_secs == 0 {
        anyhow::bail!("completion.timeout_secs must be > 0");
    }
    for (name, t) in [
        ("classify_temperature", c.classify_temperature),
        ("query_temperature", c.query_temperature),
        ("response_temperature", c.response_temperature),
        ("agent_temperature", c.agent_temperature),
    ] {
        if !(0.0..=2.0).contains(&t) {
            anyhow::bail!("completion.{} must be in [0.0, 2.0]", name);
        }
    }

    if config.backend.max_attempts == 0 {
        anyhow::bail!("backend.max_attempts must be >= 1");
    }
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    let r = &config.retrieval;
    if r.page_size == 0 {
        anyhow::bail!("retrieval.page_size must be >= 1");
    }
    if r.semantic_limit == 0 {
        anyhow::bail!("retrieval.semantic_limit must be >= 1");
    }
    if !(1..=3).contains(&r.prompt_sample_size) {
        anyhow::bail!("retrieval.prompt_sample_size must be in 1..=3");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backend.max_attempts, 3);
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.retrieval.prompt_sample_size, 3);
        assert_eq!(config.retrieval.merge_overlay, MergeOverlay::Similarity);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_partial_section() {
        let config: Config = toml::from_str(
            r#"
[backend]
url = "http://10.0.0.5:3001"

[retrieval]
merge_overlay = "fill_missing"
"#,
        )
        .unwrap();
        assert_eq!(config.backend.url, "http://10.0.0.5:3001");
        assert_eq!(config.backend.max_attempts, 3);
        assert_eq!(config.retrieval.merge_overlay, MergeOverlay::FillMissing);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nmax_attempts = 0").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("backend.max_attempts"));
    }

    #[test]
    fn test_rejects_out_of_range_temperature() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[completion]\nresponse_temperature = 3.5").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("response_temperature"));
    }

    #[test]
    fn test_prompt_sample_size_capped_at_three() {
        let mut config = Config::default();
        config.retrieval.prompt_sample_size = 3;
        assert!(validate(&config).is_ok());

        config.retrieval.prompt_sample_size = 4;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("retrieval.prompt_sample_size"));

        config.retrieval.prompt_sample_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_config_or_default(Path::new("/nonexistent/argo.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_retry_policy_from_backend() {
        let policy = BackendConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }
}
