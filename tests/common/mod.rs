/*!
 * Common test utilities for the panelglot test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use panelglot::batch::ImageTarget;
use panelglot::cache::{CacheConfig, TieredCache};
use panelglot::orchestrator::{OrchestratorConfig, RetryPolicy};
use panelglot::providers::mock::MockProvider;
use panelglot::{Config, ImageData, RequestOrchestrator};

/// Route library logs through the test harness; safe to call repeatedly
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Writes a fake image of `size` bytes into `dir`
pub fn create_test_image(dir: &Path, filename: &str, size: usize) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, vec![0x89u8; size])?;
    Ok(file_path)
}

/// In-memory image whose content depends on `seed`
pub fn sample_image(id: &str, seed: u8) -> ImageData {
    ImageData::new(id, vec![seed; 64], "image/png")
}

/// `count` distinct in-memory targets
pub fn sample_targets(count: usize) -> Vec<ImageTarget> {
    (0..count)
        .map(|i| ImageTarget::inline(sample_image(&format!("page-{:02}", i), i as u8)))
        .collect()
}

/// Orchestrator settings with short delays so retries stay fast
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(50)),
        max_concurrent_requests: 4,
        chunk_size: 1,
        rate_limit: None,
    }
}

/// Orchestrator over a mock provider with a memory-only cache
pub fn orchestrator_with(provider: Arc<MockProvider>, config: OrchestratorConfig) -> RequestOrchestrator {
    RequestOrchestrator::new(provider, None, TieredCache::new(CacheConfig::default()), config)
        .expect("mock provider has vision capability")
}

/// Application config that uses the mock provider and no durable cache
pub fn mock_config() -> Config {
    let mut config = Config::default();
    config.detection.provider = "mock".to_string();
    config.target_language = "fr".to_string();
    config.cache.durable = false;
    config.batch.min_image_bytes = 16;
    config
}
