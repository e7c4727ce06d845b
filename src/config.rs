use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::categorize::ProviderKind;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub categorize: CategorizeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Base URL of the browser's remote debugging endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra substrings; any tab whose URL contains one is dropped.
    #[serde(default)]
    pub exclude_url_contains: Vec<String>,
    /// Extra regular expressions matched against the tab URL.
    #[serde(default)]
    pub exclude_url_patterns: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_capture_timeout_secs(),
            exclude_url_contains: Vec::new(),
            exclude_url_patterns: Vec::new(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9222".to_string()
}
fn default_capture_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Base URL for caption lookups; overridable for tests and mirrors.
    #[serde(default = "default_transcript_base")]
    pub transcript_base_url: String,
    #[serde(default = "default_transcript_lang")]
    pub transcript_lang: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_fetch_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_chars: default_max_chars(),
            concurrency: default_concurrency(),
            user_agent: default_user_agent(),
            transcript_base_url: default_transcript_base(),
            transcript_lang: default_transcript_lang(),
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_fetch_retries() -> u32 {
    2
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_max_chars() -> usize {
    4000
}
fn default_concurrency() -> usize {
    4
}
fn default_user_agent() -> String {
    format!("tabman/{}", env!("CARGO_PKG_VERSION"))
}
fn default_transcript_base() -> String {
    "https://www.youtube.com".to_string()
}
fn default_transcript_lang() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategorizeConfig {
    /// Providers tried in order when none is requested explicitly.
    #[serde(default = "default_preference")]
    pub preference: Vec<ProviderKind>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    #[serde(default)]
    pub gemini: RemoteProviderConfig,
    #[serde(default)]
    pub mistral: RemoteProviderConfig,
    #[serde(default)]
    pub ollama: RemoteProviderConfig,
}

impl Default for CategorizeConfig {
    fn default() -> Self {
        Self {
            preference: default_preference(),
            timeout_secs: default_provider_timeout_secs(),
            max_tags: default_max_tags(),
            gemini: RemoteProviderConfig::default(),
            mistral: RemoteProviderConfig::default(),
            ollama: RemoteProviderConfig::default(),
        }
    }
}

fn default_preference() -> Vec<ProviderKind> {
    vec![
        ProviderKind::Gemini,
        ProviderKind::Mistral,
        ProviderKind::Ollama,
        ProviderKind::Keyword,
    ]
}
fn default_provider_timeout_secs() -> u64 {
    30
}
fn default_max_tags() -> usize {
    10
}

/// Per-backend overrides. Unset fields fall back to the backend's defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RemoteProviderConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Cumulative ledger location; defaults to `{data_dir}/all_tabs.md`.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_path: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl StorageConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("all_tabs.md"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.capture.endpoint.trim().is_empty() {
        anyhow::bail!("capture.endpoint must not be empty");
    }
    for pattern in &config.capture.exclude_url_patterns {
        regex::Regex::new(pattern)
            .with_context(|| format!("capture.exclude_url_patterns: invalid regex '{}'", pattern))?;
    }

    if config.fetch.concurrency == 0 {
        anyhow::bail!("fetch.concurrency must be > 0");
    }
    if config.fetch.max_chars == 0 {
        anyhow::bail!("fetch.max_chars must be > 0");
    }
    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be > 0");
    }

    if config.categorize.preference.is_empty() {
        anyhow::bail!("categorize.preference must list at least one provider");
    }
    if config.categorize.timeout_secs == 0 {
        anyhow::bail!("categorize.timeout_secs must be > 0");
    }
    if config.categorize.max_tags == 0 {
        anyhow::bail!("categorize.max_tags must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.capture.endpoint, "http://localhost:9222");
        assert_eq!(config.fetch.max_retries, 2);
        assert_eq!(config.categorize.preference.len(), 4);
        assert_eq!(
            config.storage.ledger_path(),
            PathBuf::from("data").join("all_tabs.md")
        );
    }

    #[test]
    fn preference_parses_lowercase_names() {
        let config: Config = toml::from_str(
            r#"
            [categorize]
            preference = ["ollama", "keyword"]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.categorize.preference,
            vec![ProviderKind::Ollama, ProviderKind::Keyword]
        );
    }

    #[test]
    fn example_config_parses() {
        let config: Config = toml::from_str(include_str!("../config/tabman.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.fetch.concurrency, 4);
        assert!(config.categorize.gemini.model.is_none());
    }

    #[test]
    fn rejects_zero_concurrency() {
        let config: Config = toml::from_str("[fetch]\nconcurrency = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_zero_max_tags() {
        let config: Config = toml::from_str("[categorize]\nmax_tags = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_bad_exclusion_regex() {
        let config: Config =
            toml::from_str("[capture]\nexclude_url_patterns = [\"(unclosed\"]\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
