/*!
 * Tests for application configuration
 */

use anyhow::Result;
use std::time::Duration;

use panelglot::app_config::{Config, LogLevel, ProviderConfig};
use panelglot::batch::BatchOptions;
use panelglot::cache::{CacheConfig, DataClass};
use panelglot::orchestrator::OrchestratorConfig;

use crate::common;

#[test]
fn test_config_saveThenLoad_shouldPreserveSettings() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config.target_language = "zh-CN".to_string();
    config.detection.fallback_provider = Some("ollama".to_string());
    config.orchestrator.rate_limit_requests = Some(30);
    config.log_level = LogLevel::Debug;
    config.save(&path)?;

    let loaded = Config::load(&path)?;
    assert_eq!(loaded.target_language, "zh-CN");
    assert_eq!(loaded.detection.fallback_provider.as_deref(), Some("ollama"));
    assert_eq!(loaded.orchestrator.rate_limit_requests, Some(30));
    assert_eq!(loaded.log_level, LogLevel::Debug);
    assert!(loaded.validate().is_ok());
    Ok(())
}

#[test]
fn test_config_load_withMalformedJson_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = dir.path().join("conf.json");
    std::fs::write(&path, "{ not json")?;

    assert!(Config::load(&path).is_err());
    Ok(())
}

#[test]
fn test_config_validate_withInvalidTargetLanguage_shouldFail() {
    let mut config = Config::default();
    config.target_language = "elvish".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validate_withFallbackEqualToPrimary_shouldFail() {
    let mut config = Config::default();
    config.detection.fallback_provider = Some(config.detection.provider.clone());
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validate_withInvertedTtls_shouldFail() {
    let mut config = Config::default();
    config.cache.translation_ttl_secs = config.cache.detection_ttl_secs + 1;
    assert!(config.validate().is_err());
}

#[test]
fn test_config_validate_withZeroRateLimit_shouldFail() {
    let mut config = Config::default();
    config.orchestrator.rate_limit_requests = Some(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_providerConfig_translationModel_shouldFallBackToModel() {
    let mut provider = ProviderConfig::new("ollama");
    assert_eq!(provider.translation_model(), "llava");

    provider.translation_model = Some("qwen2.5".to_string());
    assert_eq!(provider.translation_model(), "qwen2.5");

    provider.translation_model = Some(String::new());
    assert_eq!(provider.translation_model(), "llava");
}

#[test]
fn test_orchestratorConfig_fromSettings_shouldCarryTunables() {
    let mut config = Config::default();
    config.orchestrator.timeout_secs = 12;
    config.orchestrator.max_retries = 5;
    config.orchestrator.rate_limit_requests = Some(10);
    config.orchestrator.rate_limit_window_secs = 30;

    let orchestrator = OrchestratorConfig::from(&config.orchestrator);

    assert_eq!(orchestrator.timeout, Duration::from_secs(12));
    assert_eq!(orchestrator.retry.max_retries, 5);
    let rate_limit = orchestrator.rate_limit.unwrap();
    assert_eq!(rate_limit.max_requests, 10);
    assert_eq!(rate_limit.window, Duration::from_secs(30));
}

#[test]
fn test_cacheConfig_fromSettings_shouldMapTtlsPerClass() {
    let config = Config::default();
    let cache = CacheConfig::from(&config.cache);

    assert_eq!(
        cache.ttl(DataClass::Translation),
        Duration::from_secs(config.cache.translation_ttl_secs)
    );
    assert!(cache.ttl(DataClass::Detection) >= cache.ttl(DataClass::Translation));
    assert!(cache.ttl(DataClass::Configuration) >= cache.ttl(DataClass::Detection));
}

#[test]
fn test_batchOptions_fromConfig_shouldUseLanguagesAndBatchSize() {
    let mut config = common::mock_config();
    config.source_language = Some("ja".to_string());
    config.batch.batch_size = 3;

    let options = BatchOptions::from(&config);

    assert_eq!(options.batch_size, 3);
    assert_eq!(options.target_language, "fr");
    assert_eq!(options.detect.source_language.as_deref(), Some("ja"));
    assert_eq!(options.translate.source_language.as_deref(), Some("ja"));
}
