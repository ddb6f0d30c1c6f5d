use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Target language tag (e.g. "fr", "zh-CN")
    pub target_language: String,

    /// Source language tag, auto-detected when absent
    #[serde(default)]
    pub source_language: Option<String>,

    /// Which providers detect and translate
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Available provider configurations
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    /// Request orchestration tunables
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Cache tiers and TTLs
    #[serde(default)]
    pub cache: CacheSettings,

    /// Batch run settings
    #[serde(default)]
    pub batch: BatchSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Provider selection for detection and translation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Primary provider id (also used for translation)
    #[serde(default = "default_primary_provider")]
    pub provider: String,

    /// Provider id used when the primary finds nothing or fails
    #[serde(default)]
    pub fallback_provider: Option<String>,

    /// Regions below this confidence are discarded
    #[serde(default)]
    pub min_confidence: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            provider: default_primary_provider(),
            fallback_provider: None,
            min_confidence: 0.0,
        }
    }
}

/// Provider configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Provider type identifier, the registry key
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Model used for text detection
    #[serde(default = "String::new")]
    pub model: String,

    /// Model used for translation, defaults to `model`
    #[serde(default)]
    pub translation_model: Option<String>,

    /// API key
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Transport timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Provider config with defaults for a known provider type
    pub fn new(provider_type: &str) -> Self {
        let (model, endpoint) = match provider_type {
            "openai" => (default_openai_model(), default_openai_endpoint()),
            "ollama" => (default_ollama_model(), default_ollama_endpoint()),
            _ => (String::new(), String::new()),
        };

        Self {
            provider_type: provider_type.to_string(),
            model,
            translation_model: None,
            api_key: String::new(),
            endpoint,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Model used for translation requests
    pub fn translation_model(&self) -> &str {
        self.translation_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.model)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Request orchestrator tunables
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrchestratorSettings {
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "default_retry_count")]
    pub max_retries: u32,

    /// Base backoff in milliseconds, doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Maximum simultaneous outbound calls
    #[serde(default = "default_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Texts per translation call when the provider cannot batch natively
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Rate limit window in seconds
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Requests allowed per window, unlimited when absent
    #[serde(default)]
    pub rate_limit_requests: Option<u32>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            max_concurrent_requests: default_concurrent_requests(),
            chunk_size: default_chunk_size(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_requests: None,
        }
    }
}

impl OrchestratorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Cache tiers and TTLs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheSettings {
    /// Maximum entries in the memory tier
    #[serde(default = "default_cache_max_items")]
    pub max_items: usize,

    /// Maximum payload bytes in the memory tier
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: usize,

    /// Seconds between sweeps of expired memory entries
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Whether the durable tier is used
    #[serde(default = "default_true")]
    pub durable: bool,

    /// Whether writes are queued while offline
    #[serde(default = "default_true")]
    pub offline_queue: bool,

    /// Database file, defaults to the user data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// TTL for translation results, in seconds
    #[serde(default = "default_translation_ttl_secs")]
    pub translation_ttl_secs: u64,

    /// TTL for detection results, in seconds
    #[serde(default = "default_detection_ttl_secs")]
    pub detection_ttl_secs: u64,

    /// TTL for configuration-shaped data, in seconds
    #[serde(default = "default_configuration_ttl_secs")]
    pub configuration_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_items: default_cache_max_items(),
            max_bytes: default_cache_max_bytes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            durable: true,
            offline_queue: true,
            database_path: None,
            translation_ttl_secs: default_translation_ttl_secs(),
            detection_ttl_secs: default_detection_ttl_secs(),
            configuration_ttl_secs: default_configuration_ttl_secs(),
        }
    }
}

/// Batch run settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchSettings {
    /// Targets processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Images smaller than this are skipped (icons, spacers)
    #[serde(default = "default_min_image_bytes")]
    pub min_image_bytes: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            min_image_bytes: default_min_image_bytes(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_primary_provider() -> String {
    "openai".to_string()
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("openai"),
        ProviderConfig::new("ollama"),
        ProviderConfig::new("mock"),
    ]
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_chunk_size() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // doubled on each retry
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_true() -> bool {
    true
}

fn default_cache_max_items() -> usize {
    2000
}

fn default_cache_max_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_translation_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_detection_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_configuration_ttl_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_batch_size() -> usize {
    5
}

fn default_min_image_bytes() -> u64 {
    4 * 1024
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_ollama_model() -> String {
    "llava".to_string()
}

impl Config {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write this configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        crate::language_utils::validate_language_tag(&self.target_language)?;
        if let Some(source) = &self.source_language {
            crate::language_utils::validate_language_tag(source)?;
        }

        if self.get_provider_config(&self.detection.provider).is_none() {
            return Err(anyhow!(
                "No configuration for provider '{}'",
                self.detection.provider
            ));
        }

        if let Some(fallback) = &self.detection.fallback_provider {
            if self.get_provider_config(fallback).is_none() {
                return Err(anyhow!("No configuration for fallback provider '{}'", fallback));
            }
            if fallback == &self.detection.provider {
                return Err(anyhow!("Fallback provider must differ from the primary provider"));
            }
        }

        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(anyhow!("min_confidence must be between 0 and 1"));
        }

        let orchestrator = &self.orchestrator;
        if orchestrator.max_concurrent_requests == 0 {
            return Err(anyhow!("max_concurrent_requests must be at least 1"));
        }
        if orchestrator.chunk_size == 0 {
            return Err(anyhow!("chunk_size must be at least 1"));
        }
        if orchestrator.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be at least 1"));
        }
        if orchestrator.retry_max_delay_ms < orchestrator.retry_backoff_ms {
            return Err(anyhow!("retry_max_delay_ms must not be below retry_backoff_ms"));
        }
        if orchestrator.rate_limit_requests == Some(0) {
            return Err(anyhow!("rate_limit_requests must be at least 1 when set"));
        }

        if self.batch.batch_size == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }

        let cache = &self.cache;
        if cache.translation_ttl_secs > cache.detection_ttl_secs
            || cache.detection_ttl_secs > cache.configuration_ttl_secs
        {
            return Err(anyhow!(
                "Cache TTLs must satisfy translation <= detection <= configuration"
            ));
        }

        Ok(())
    }

    /// Get a provider configuration by type
    pub fn get_provider_config(&self, provider_type: &str) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|p| p.provider_type.eq_ignore_ascii_case(provider_type))
    }

    /// Configuration of the primary provider
    pub fn primary_provider_config(&self) -> Result<&ProviderConfig> {
        self.get_provider_config(&self.detection.provider)
            .ok_or_else(|| anyhow!("No configuration for provider '{}'", self.detection.provider))
    }

    /// Configuration of the fallback provider, if one is selected
    pub fn fallback_provider_config(&self) -> Result<Option<&ProviderConfig>> {
        match &self.detection.fallback_provider {
            Some(id) => self
                .get_provider_config(id)
                .map(Some)
                .ok_or_else(|| anyhow!("No configuration for fallback provider '{}'", id)),
            None => Ok(None),
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            target_language: "en".to_string(),
            source_language: None,
            detection: DetectionConfig::default(),
            providers: default_providers(),
            orchestrator: OrchestratorSettings::default(),
            cache: CacheSettings::default(),
            batch: BatchSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}
