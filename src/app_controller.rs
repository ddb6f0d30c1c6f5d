use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::app_config::{Config, ProviderConfig};
use crate::batch::{BatchEvent, BatchOptions, BatchProcessor, BatchProgress, DirectoryTargets, ImageTarget, TargetSource};
use crate::cache::{CacheConfig, CacheStats, KeyValueStore, OfflineQueue, TieredCache};
use crate::database::connection::DatabaseStats;
use crate::database::SqliteStore;
use crate::errors::OrchestratorError;
use crate::file_utils::FileManager;
use crate::orchestrator::{OrchestratorConfig, RequestOrchestrator};
use crate::providers::{ProviderRegistry, ValidationReport};

// @module: Application controller wiring config, providers, cache and batches

/// Pre-flight result for one configured provider
#[derive(Debug, Clone)]
pub struct ProviderCheck {
    pub provider_type: String,
    pub report: ValidationReport,
    /// Initialization failure, if the configuration looked valid
    pub init_error: Option<OrchestratorError>,
}

impl ProviderCheck {
    pub fn is_ok(&self) -> bool {
        self.report.is_valid && self.init_error.is_none()
    }
}

/// Main application controller for image translation runs
pub struct Controller {
    // @field: App configuration
    config: Config,
    registry: ProviderRegistry,
    orchestrator: RequestOrchestrator,
    /// Durable tier, when enabled
    store: Option<SqliteStore>,
    sweeper: CancellationToken,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.registry)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a controller for test purposes: mock provider, memory-only cache
    pub fn new_for_test() -> Result<Self> {
        let mut config = Config::default();
        config.detection.provider = "mock".to_string();
        config.cache.durable = false;
        Self::with_store(config, ProviderRegistry::with_builtin(), None)
    }

    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let store = if config.cache.durable {
            let store = match &config.cache.database_path {
                Some(path) => SqliteStore::open(path)?,
                None => SqliteStore::open_default()?,
            };
            Some(store)
        } else {
            None
        };
        Self::with_store(config, ProviderRegistry::with_builtin(), store)
    }

    /// Create a controller with an explicit registry and durable store
    pub fn with_store(config: Config, registry: ProviderRegistry, store: Option<SqliteStore>) -> Result<Self> {
        config.validate()?;

        let primary = registry
            .create(config.primary_provider_config()?)
            .context("Failed to create primary provider")?;
        let fallback = match config.fallback_provider_config()? {
            Some(fallback) => Some(
                registry
                    .create(fallback)
                    .context("Failed to create fallback provider")?,
            ),
            None => None,
        };

        let durable: Option<Arc<dyn KeyValueStore>> = store
            .clone()
            .map(|store| Arc::new(store) as Arc<dyn KeyValueStore>);
        let offline = match &durable {
            Some(durable) if config.cache.offline_queue => Some(OfflineQueue::new(durable.clone())),
            _ => None,
        };
        let cache = TieredCache::with_tiers(CacheConfig::from(&config.cache), durable, offline);

        let orchestrator = RequestOrchestrator::new(
            primary,
            fallback,
            cache,
            OrchestratorConfig::from(&config.orchestrator),
        )?;

        Ok(Self {
            config,
            registry,
            orchestrator,
            store,
            sweeper: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    pub fn cache(&self) -> &TieredCache {
        self.orchestrator.cache()
    }

    /// Initialize providers and start the cache sweeper
    pub async fn initialize(&self) -> Result<()> {
        self.orchestrator.initialize().await?;

        let interval = Duration::from_secs(self.config.cache.sweep_interval_secs.max(1));
        self.cache().spawn_sweeper(interval, self.sweeper.clone());

        if let Some(store) = &self.store {
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!("Purged {} expired cache entries", removed),
                Err(e) => warn!("Failed to purge expired cache entries: {:#}", e),
            }
        }
        Ok(())
    }

    /// Check every configured provider without touching the orchestrator
    pub async fn validate_providers(&self) -> Vec<ProviderCheck> {
        let mut checks = Vec::with_capacity(self.config.providers.len());
        for provider_config in &self.config.providers {
            checks.push(self.check_provider(provider_config).await);
        }
        checks
    }

    async fn check_provider(&self, provider_config: &ProviderConfig) -> ProviderCheck {
        let provider_type = provider_config.provider_type.clone();
        let provider = match self.registry.create(provider_config) {
            Ok(provider) => provider,
            Err(e) => {
                return ProviderCheck {
                    provider_type,
                    report: ValidationReport::invalid(e.to_string()),
                    init_error: None,
                };
            }
        };

        let report = provider.validate_config();
        let init_error = if report.is_valid {
            let result = provider.initialize().await;
            if let Err(e) = provider.terminate().await {
                debug!("Failed to terminate {} after validation: {}", provider.id(), e);
            }
            result.err().map(|e| OrchestratorError::from_provider("initialize", 1, &e))
        } else {
            None
        };

        ProviderCheck {
            provider_type,
            report,
            init_error,
        }
    }

    /// New batch processor sharing this controller's orchestrator
    pub fn batch_processor(&self) -> BatchProcessor {
        BatchProcessor::new(self.orchestrator.clone(), BatchOptions::from(&self.config))
    }

    /// Translate every image under `input_dir`, writing `<image>.translations.json`
    /// next to each one. Images that already have output are skipped unless
    /// `force_overwrite` is set. Ctrl-C cancels after the current batch.
    pub async fn run_folder(&self, input_dir: PathBuf, force_overwrite: bool) -> Result<BatchProgress> {
        let start_time = std::time::Instant::now();

        if !FileManager::dir_exists(&input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let all_targets = DirectoryTargets::new(&input_dir)
            .with_min_image_bytes(self.config.batch.min_image_bytes)
            .targets()
            .await?;
        let found = all_targets.len();
        let targets: Vec<ImageTarget> = all_targets
            .into_iter()
            .filter(|target| {
                force_overwrite
                    || target
                        .path()
                        .map(|path| !FileManager::file_exists(FileManager::output_path_for(path)))
                        .unwrap_or(true)
            })
            .collect();

        if targets.len() < found {
            info!(
                "Skipping {} images with existing translations (use -f to force overwrite)",
                found - targets.len()
            );
        }
        if targets.is_empty() {
            warn!("No images to process in {:?}", input_dir);
            return Ok(BatchProgress::new(0));
        }

        let processor = self.batch_processor();
        let control = processor.control();

        // Ctrl-C lets the batch in progress finish, then stops.
        let interrupt = control.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing the current batch");
                interrupt.cancel();
            }
        });

        let progress_bar = ProgressBar::new(targets.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.set_message(format!("→ {}", self.config.target_language));

        let result = processor
            .run(&targets, |event| self.handle_event(event, &progress_bar))
            .await;

        signal_task.abort();
        progress_bar.finish_and_clear();

        let progress = result?;
        info!(
            "Processed {}/{} images ({} failed) in {}",
            progress.processed,
            progress.total,
            progress.failed,
            Self::format_duration(start_time.elapsed())
        );
        info!("{}", self.orchestrator.stats().summary());
        Ok(progress)
    }

    fn handle_event(&self, event: &BatchEvent, progress_bar: &ProgressBar) {
        match event {
            BatchEvent::Started { run_id, total } => {
                debug!("Run {} over {} images", run_id, total);
            }
            BatchEvent::TargetCompleted(outcome) => {
                progress_bar.inc(1);
                let output_path = FileManager::output_path_for(Path::new(&outcome.target_id));
                let written = serde_json::to_string_pretty(outcome)
                    .context("Failed to serialize translations")
                    .and_then(|json| FileManager::write_to_file(&output_path, &json));
                match written {
                    Ok(()) => debug!("Wrote {}", output_path.display()),
                    Err(e) => error!("Failed to save {}: {:#}", output_path.display(), e),
                }
            }
            BatchEvent::TargetFailed { target_id, error } => {
                progress_bar.inc(1);
                progress_bar.suspend(|| {
                    error!("{}: {} ({})", target_id, error, error.kind.remediation_hint());
                });
            }
            BatchEvent::BatchFinished { progress, .. } => {
                if let Some(eta) = progress.eta() {
                    progress_bar.set_message(format!(
                        "→ {} · {:.2} img/s · ~{}",
                        self.config.target_language,
                        progress.throughput(),
                        Self::format_duration(eta)
                    ));
                }
            }
            BatchEvent::Paused(_) => progress_bar.set_message("paused"),
            BatchEvent::Resumed(_) => progress_bar.set_message("resumed"),
            BatchEvent::Completed(_) => {}
            BatchEvent::Cancelled(progress) => {
                progress_bar.suspend(|| {
                    warn!(
                        "Run cancelled: {}/{} images processed",
                        progress.processed, progress.total
                    );
                });
            }
        }
    }

    /// Memory-tier counters and, when enabled, durable-tier statistics
    pub async fn cache_stats(&self) -> Result<(CacheStats, Option<DatabaseStats>)> {
        let durable = match &self.store {
            Some(store) => Some(store.connection().stats().await?),
            None => None,
        };
        Ok((self.cache().stats(), durable))
    }

    /// Drop every cached entry in every tier
    pub async fn clear_cache(&self) -> Result<usize> {
        let removed = self.cache().clear().await;
        if let Some(store) = &self.store {
            store
                .connection()
                .vacuum()
                .await
                .context("Failed to compact the cache database")?;
        }
        Ok(removed)
    }

    /// Stop background work and release providers
    pub async fn shutdown(&self) {
        self.sweeper.cancel();
        self.orchestrator.shutdown().await;
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
