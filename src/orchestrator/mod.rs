/*!
 * Request orchestration between callers and provider engines.
 *
 * The orchestrator is the only path from callers to providers. Every call
 * goes through the same pipeline:
 * - cache lookup
 * - in-flight deduplication (detection)
 * - rolling-window rate limit and a global concurrency bound
 * - per-call timeout
 * - classified retry with exponential backoff
 *
 * Callers only ever see `OrchestratorError`.
 */

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::app_config::{OrchestratorSettings, ProviderConfig};
use crate::cache::{DataClass, TieredCache};
use crate::errors::{ErrorKind, OrchestratorError, ProviderError};
use crate::fingerprint::Fingerprint;
use crate::model::{DetectOptions, ImageData, TextArea, TranslateOptions, TranslationRequest};
use crate::ocr::{self, FallbackDetector};
use crate::providers::{Capability, Provider, ProviderRegistry};

pub mod rate_limit;
pub mod retry;
pub mod stats;

pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use stats::{Stats, StatsSnapshot};

/// Orchestrator tunables
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a single provider call
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Maximum simultaneous outbound calls
    pub max_concurrent_requests: usize,
    /// Texts per call when the provider cannot batch natively
    pub chunk_size: usize,
    pub rate_limit: Option<RateLimitConfig>,
}

impl From<&OrchestratorSettings> for OrchestratorConfig {
    fn from(settings: &OrchestratorSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            retry: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.retry_backoff_ms),
                Duration::from_millis(settings.retry_max_delay_ms),
            ),
            max_concurrent_requests: settings.max_concurrent_requests.max(1),
            chunk_size: settings.chunk_size.max(1),
            rate_limit: settings
                .rate_limit_requests
                .map(|requests| RateLimitConfig::new(requests, settings.rate_limit_window())),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

type DetectionResult = Result<Vec<TextArea>, OrchestratorError>;
type SharedDetection = Shared<BoxFuture<'static, DetectionResult>>;
type InFlightMap = Arc<Mutex<HashMap<Fingerprint, SharedDetection>>>;

/// Removes an in-flight entry when the dispatch task ends, however it ends
struct InFlightGuard {
    map: InFlightMap,
    fingerprint: Fingerprint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.map.lock().remove(&self.fingerprint);
    }
}

/// Installed providers; the primary also translates
#[derive(Debug)]
struct ProviderSlot {
    detector: FallbackDetector,
    generation: u64,
}

impl ProviderSlot {
    fn detection_fingerprint(&self, image: &ImageData, options: &DetectOptions) -> Fingerprint {
        Fingerprint::detection(
            self.detector.primary().id(),
            self.detector.fallback().map(|fallback| fallback.id()),
            image.digest(),
            options,
        )
    }
}

struct Inner {
    slot: RwLock<ProviderSlot>,
    cache: TieredCache,
    inflight: InFlightMap,
    rate_limiter: RateLimiter,
    concurrency: Semaphore,
    stats: Stats,
    config: OrchestratorConfig,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("slot", &self.slot)
            .field("in_flight", &self.inflight.lock().len())
            .field("stats", &self.stats.snapshot())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Cheap, clonable handle to the shared orchestrator
#[derive(Debug, Clone)]
pub struct RequestOrchestrator {
    inner: Arc<Inner>,
}

impl RequestOrchestrator {
    /// Create an orchestrator over a primary provider and an optional detection fallback
    pub fn new(
        primary: Arc<dyn Provider>,
        fallback: Option<Arc<dyn Provider>>,
        cache: TieredCache,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let detector = FallbackDetector::new(primary, fallback)
            .map_err(|e| OrchestratorError::from_provider("new", 0, &e))?;

        Ok(Self {
            inner: Arc::new(Inner {
                slot: RwLock::new(ProviderSlot {
                    detector,
                    generation: 0,
                }),
                cache,
                inflight: Arc::new(Mutex::new(HashMap::new())),
                rate_limiter: RateLimiter::new(config.rate_limit),
                concurrency: Semaphore::new(config.max_concurrent_requests.max(1)),
                stats: Stats::default(),
                config,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Initialize every installed provider
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        let slot = self.inner.slot.read().await;
        let primary = slot.detector.primary();
        primary
            .initialize()
            .await
            .map_err(|e| OrchestratorError::from_provider("initialize", 1, &e))?;
        if let Some(fallback) = slot.detector.fallback() {
            fallback
                .initialize()
                .await
                .map_err(|e| OrchestratorError::from_provider("initialize", 1, &e))?;
        }
        Ok(())
    }

    pub fn cache(&self) -> &TieredCache {
        &self.inner.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    /// Number of provider switches so far
    pub async fn generation(&self) -> u64 {
        self.inner.slot.read().await.generation
    }

    /// Identifier of the active primary provider
    pub async fn provider_id(&self) -> String {
        self.inner.slot.read().await.detector.primary().id().to_string()
    }

    /// Fingerprints currently being dispatched
    pub fn in_flight(&self) -> usize {
        self.inner.inflight.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Token cancelled by `shutdown`
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Run one provider call through rate limit, concurrency bound, timeout and retry
    async fn call_with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, OrchestratorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let inner = &self.inner;
        let policy = inner.config.retry;
        let mut attempt: u32 = 0;

        loop {
            let attempted = async {
                inner.rate_limiter.acquire().await;
                let _permit = inner
                    .concurrency
                    .acquire()
                    .await
                    .map_err(|_| ProviderError::RequestFailed("concurrency limiter closed".to_string()))?;

                // Dropping the call future on timeout aborts the underlying request.
                match tokio::time::timeout(inner.config.timeout, call()).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "{} did not complete within {:?}",
                        operation, inner.config.timeout
                    ))),
                }
            };

            let result = tokio::select! {
                _ = inner.shutdown.cancelled() => {
                    return Err(OrchestratorError::cancelled(operation, attempt + 1));
                }
                result = attempted => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.kind().is_retryable() || attempt >= policy.max_retries {
                return Err(OrchestratorError::from_provider(operation, attempt + 1, &error));
            }

            let delay = policy.delay_for(attempt, &error);
            warn!(
                "{} attempt {} failed ({}), retrying in {:?}",
                operation,
                attempt + 1,
                error,
                delay
            );
            inner.stats.record_retry();

            tokio::select! {
                _ = inner.shutdown.cancelled() => {
                    return Err(OrchestratorError::cancelled(operation, attempt + 1));
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn record_outcome<T>(&self, result: &Result<T, OrchestratorError>) {
        match result {
            Ok(_) => self.inner.stats.record_success(),
            Err(_) => self.inner.stats.record_failure(),
        }
    }

    /// Detect text regions, deduplicating identical concurrent requests
    pub async fn detect_text(
        &self,
        image: &ImageData,
        options: &DetectOptions,
    ) -> Result<Vec<TextArea>, OrchestratorError> {
        if self.is_shut_down() {
            return Err(OrchestratorError::cancelled("detect_text", 0));
        }

        let (fingerprint, generation) = {
            let slot = self.inner.slot.read().await;
            (slot.detection_fingerprint(image, options), slot.generation)
        };
        let key = DataClass::Detection.key(fingerprint);

        if let Some(areas) = self.inner.cache.get::<Vec<TextArea>>(&key).await {
            debug!("Detection cache hit for {}", image.id);
            self.inner.stats.record_cache_hits(1);
            return Ok(areas);
        }

        let pending = {
            let mut inflight = self.inner.inflight.lock();
            match inflight.get(&fingerprint) {
                Some(pending) => {
                    debug!("Joining in-flight detection for {}", image.id);
                    self.inner.stats.record_dedup();
                    pending.clone()
                }
                None => {
                    let pending =
                        self.spawn_detection(fingerprint, generation, key, image.clone(), options.clone());
                    inflight.insert(fingerprint, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Drive a detection on its own task so no single caller can strand it
    fn spawn_detection(
        &self,
        fingerprint: Fingerprint,
        generation: u64,
        key: String,
        image: ImageData,
        options: DetectOptions,
    ) -> SharedDetection {
        let this = self.clone();
        let guard = InFlightGuard {
            map: self.inner.inflight.clone(),
            fingerprint,
        };

        let handle = tokio::spawn(async move {
            let _guard = guard;
            this.inner.stats.record_dispatch();
            let (result, current) = this.run_detection(&image, &options, generation).await;
            this.record_outcome(&result);
            match &result {
                Ok(areas) if current => this.inner.cache.put(&key, areas, DataClass::Detection).await,
                Ok(_) => debug!("Providers changed while detecting {}, result not cached", image.id),
                Err(_) => {}
            }
            result
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(OrchestratorError::new(
                    ErrorKind::Unknown,
                    "detect_text",
                    0,
                    format!("detection task failed: {}", e),
                ))
            })
        }
        .boxed()
        .shared()
    }

    /// Run the fallback chain; the flag is false when a provider switch
    /// landed after the request was fingerprinted
    async fn run_detection(
        &self,
        image: &ImageData,
        options: &DetectOptions,
        generation: u64,
    ) -> (DetectionResult, bool) {
        // Held for the whole call so a provider switch waits for it.
        let slot = self.inner.slot.read().await;
        let result = slot
            .detector
            .detect_via(move |provider| async move {
                let provider = &provider;
                self.call_with_retry("detect_text", move || provider.detect_text(image, options))
                    .await
            })
            .await;
        (result, slot.generation == generation)
    }

    /// Translate `texts`, returning results in the same order
    ///
    /// Blank texts are returned unchanged without a provider call. Repeated
    /// texts are sent once.
    pub async fn translate_text(
        &self,
        texts: &[String],
        target_language: &str,
        options: &TranslateOptions,
    ) -> Result<Vec<String>, OrchestratorError> {
        if self.is_shut_down() {
            return Err(OrchestratorError::cancelled("translate_text", 0));
        }

        let slot = self.inner.slot.read().await;
        let provider = slot.detector.primary().clone();
        if !provider.supports(Capability::Translate) {
            return Err(OrchestratorError::new(
                ErrorKind::InvalidRequest,
                "translate_text",
                0,
                format!("{} cannot translate", provider.id()),
            ));
        }

        let mut results: Vec<Option<String>> = vec![None; texts.len()];
        // Distinct missing texts in first-seen order, with every position they fill
        let mut misses: Vec<(String, Vec<usize>)> = Vec::new();
        let mut miss_slots: HashMap<String, usize> = HashMap::new();
        let mut hits = 0;

        for (index, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results[index] = Some(text.clone());
                continue;
            }
            let key = DataClass::Translation.key(Fingerprint::translation(
                provider.id(),
                text,
                target_language,
                options,
            ));
            if let Some(&slot) = miss_slots.get(&key) {
                misses[slot].1.push(index);
                continue;
            }
            match self.inner.cache.get::<String>(&key).await {
                Some(translation) => {
                    results[index] = Some(translation);
                    hits += 1;
                }
                None => {
                    miss_slots.insert(key.clone(), misses.len());
                    misses.push((key, vec![index]));
                }
            }
        }
        self.inner.stats.record_cache_hits(hits);

        if !misses.is_empty() {
            let pending: Vec<String> = misses
                .iter()
                .map(|(_, positions)| texts[positions[0]].clone())
                .collect();
            let translated = self
                .dispatch_translations(&provider, pending, target_language, options)
                .await?;

            for ((key, positions), translation) in misses.into_iter().zip(translated) {
                self.inner.cache.put(&key, &translation, DataClass::Translation).await;
                for index in positions {
                    results[index] = Some(translation.clone());
                }
            }
        }

        Ok(results.into_iter().map(Option::unwrap_or_default).collect())
    }

    async fn dispatch_translations(
        &self,
        provider: &Arc<dyn Provider>,
        texts: Vec<String>,
        target_language: &str,
        options: &TranslateOptions,
    ) -> Result<Vec<String>, OrchestratorError> {
        if texts.len() == 1 || provider.supports(Capability::BatchTranslate) {
            let native_batch = texts.len() > 1;
            return self
                .translate_chunk(provider, texts, target_language, options, native_batch)
                .await;
        }

        let chunks: Vec<Vec<String>> = texts
            .chunks(self.inner.config.chunk_size)
            .map(<[String]>::to_vec)
            .collect();
        debug!(
            "{} has no native batch, sending {} texts in {} chunks",
            provider.id(),
            texts.len(),
            chunks.len()
        );

        let translated: Vec<Vec<String>> = stream::iter(chunks)
            .map(|chunk| self.translate_chunk(provider, chunk, target_language, options, false))
            .buffered(self.inner.config.max_concurrent_requests)
            .try_collect()
            .await?;

        Ok(translated.into_iter().flatten().collect())
    }

    async fn translate_chunk(
        &self,
        provider: &Arc<dyn Provider>,
        texts: Vec<String>,
        target_language: &str,
        options: &TranslateOptions,
        native_batch: bool,
    ) -> Result<Vec<String>, OrchestratorError> {
        let request = TranslationRequest::new(texts, target_language, options);
        let operation = if native_batch { "translate_batch" } else { "translate_text" };
        let request = &request;

        self.inner.stats.record_dispatch();
        let result = self
            .call_with_retry(operation, move || async move {
                let response = if native_batch {
                    provider.translate_batch(request).await?
                } else {
                    provider.translate_text(request).await?
                };
                if response.translations.len() != request.len() {
                    return Err(ProviderError::ParseError(format!(
                        "expected {} translations, got {}",
                        request.len(),
                        response.translations.len()
                    )));
                }
                Ok(response.translations)
            })
            .await;
        self.record_outcome(&result);
        result
    }

    /// Build, initialize and install a new primary provider
    ///
    /// The old provider stays installed if the new one fails to initialize.
    pub async fn switch_provider(
        &self,
        registry: &ProviderRegistry,
        config: &ProviderConfig,
    ) -> Result<(), OrchestratorError> {
        let replacement = Self::prepare_provider(registry, config).await?;

        let mut slot = self.inner.slot.write().await;
        if let Err(e) = slot.detector.replace_primary(replacement.clone()).await {
            ocr::terminate_quietly(&replacement).await;
            return Err(OrchestratorError::from_provider("switch_provider", 1, &e));
        }
        slot.generation += 1;
        info!(
            "Switched primary provider to {} (generation {})",
            replacement.id(),
            slot.generation
        );
        Ok(())
    }

    /// Install, replace or remove the detection fallback
    pub async fn set_fallback(
        &self,
        registry: &ProviderRegistry,
        config: Option<&ProviderConfig>,
    ) -> Result<(), OrchestratorError> {
        let replacement = match config {
            Some(config) => Some(Self::prepare_provider(registry, config).await?),
            None => None,
        };

        let mut slot = self.inner.slot.write().await;
        if let Err(e) = slot.detector.replace_fallback(replacement.clone()).await {
            if let Some(replacement) = &replacement {
                ocr::terminate_quietly(replacement).await;
            }
            return Err(OrchestratorError::from_provider("set_fallback", 1, &e));
        }
        slot.generation += 1;
        Ok(())
    }

    async fn prepare_provider(
        registry: &ProviderRegistry,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn Provider>, OrchestratorError> {
        let provider = registry
            .create(config)
            .map_err(|e| OrchestratorError::from_provider("switch_provider", 0, &e))?;
        if !provider.supports(Capability::VisionDetect) {
            return Err(OrchestratorError::new(
                ErrorKind::InvalidRequest,
                "switch_provider",
                0,
                format!("{} cannot detect text in images", provider.id()),
            ));
        }
        provider
            .initialize()
            .await
            .map_err(|e| OrchestratorError::from_provider("switch_provider", 1, &e))?;
        Ok(provider)
    }

    /// Cancel pending calls and release every provider
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        let slot = self.inner.slot.write().await;
        slot.detector.terminate_all().await;
        info!("Orchestrator shut down: {}", self.inner.stats.snapshot().summary());
    }
}
