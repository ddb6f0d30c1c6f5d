/*!
 * Mock provider implementation for testing.
 *
 * The mock simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds
 * - `MockProvider::intermittent(n)` - Fails every nth call
 * - `MockProvider::failing()` - Always fails with a server error
 *
 * Scripted failures queued with `with_failures` are returned first, in
 * order, before the behavior applies. Clones share call counters.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Capability, Provider, ValidationReport};
use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::model::{
    BoundingBox, DetectOptions, ImageData, TextArea, TextType, TranslationRequest, TranslationResponse,
};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails every Nth call with a 503
    Intermittent { fail_every: usize },
    /// Always fails with a 500
    Failing,
    /// Returns one translation fewer than requested
    Misaligned,
}

/// Call counters shared between clones
#[derive(Debug, Default)]
pub struct MockCounters {
    pub initialize: AtomicUsize,
    pub detect: AtomicUsize,
    pub translate: AtomicUsize,
    pub batch: AtomicUsize,
    pub terminate: AtomicUsize,
    /// Calls currently inside the provider
    pub active: AtomicUsize,
    /// Highest value `active` has reached
    pub peak_active: AtomicUsize,
}

/// Marks one call as active until dropped, even if the caller gives up
struct ActiveCall<'a>(&'a MockCounters);

impl<'a> ActiveCall<'a> {
    fn enter(counters: &'a MockCounters) -> Self {
        let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_active.fetch_max(active, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock provider for testing orchestration behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    id: String,
    capabilities: Vec<Capability>,
    behavior: MockBehavior,
    /// Regions returned by `detect_text`
    detection: Vec<TextArea>,
    /// Errors returned, in order, before the behavior applies
    failures: Arc<Mutex<VecDeque<ProviderError>>>,
    /// Error returned by `initialize`
    init_error: Option<ProviderError>,
    /// Simulated latency per call
    delay: Option<Duration>,
    /// Request counter for intermittent failures
    request_count: Arc<AtomicUsize>,
    counters: Arc<MockCounters>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            id: "mock".to_string(),
            capabilities: vec![
                Capability::VisionDetect,
                Capability::Translate,
                Capability::BatchTranslate,
            ],
            behavior,
            detection: vec![
                TextArea::new(BoundingBox::new(10.0, 10.0, 120.0, 40.0), "Hello", "mock")
                    .with_type(TextType::Dialogue),
            ],
            failures: Arc::new(Mutex::new(VecDeque::new())),
            init_error: None,
            delay: None,
            request_count: Arc::new(AtomicUsize::new(0)),
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Registry factory; the configured model becomes the provider id when set
    pub fn factory(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let mut provider = Self::working();
        if !config.model.trim().is_empty() {
            provider.id = config.model.clone();
        }
        Ok(Arc::new(provider))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn with_detection(mut self, areas: Vec<TextArea>) -> Self {
        self.detection = areas;
        self
    }

    /// Queue errors to return before succeeding
    pub fn with_failures(self, failures: Vec<ProviderError>) -> Self {
        self.failures.lock().extend(failures);
        self
    }

    pub fn with_init_error(mut self, error: ProviderError) -> Self {
        self.init_error = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn counters(&self) -> &MockCounters {
        &self.counters
    }

    pub fn detect_calls(&self) -> usize {
        self.counters.detect.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.counters.translate.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.counters.batch.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.counters.terminate.load(Ordering::SeqCst)
    }

    /// Most calls that were ever running at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak_active.load(Ordering::SeqCst)
    }

    /// Shared path for every dispatching call: latency, scripted errors, behavior
    async fn simulate(&self) -> Result<(), ProviderError> {
        let _active = ActiveCall::enter(&self.counters);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }

        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MockBehavior::Intermittent { fail_every } if count % fail_every == fail_every - 1 => {
                Err(ProviderError::ApiError {
                    message: format!("Simulated intermittent failure (request #{})", count + 1),
                    status_code: 503,
                })
            }
            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),
            _ => Ok(()),
        }
    }

    fn translate_all(&self, request: &TranslationRequest) -> TranslationResponse {
        let mut translations: Vec<String> = request
            .texts
            .iter()
            .map(|text| format!("[{}] {}", request.target_language, text))
            .collect();
        if self.behavior == MockBehavior::Misaligned {
            translations.pop();
        }
        TranslationResponse::new(translations)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        self.counters.initialize.fetch_add(1, Ordering::SeqCst);
        match &self.init_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn detect_text(
        &self,
        _image: &ImageData,
        options: &DetectOptions,
    ) -> Result<Vec<TextArea>, ProviderError> {
        self.counters.detect.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self
            .detection
            .iter()
            .filter(|area| area.confidence >= options.min_confidence)
            .map(|area| TextArea {
                detection_method: self.id.clone(),
                ..area.clone()
            })
            .collect())
    }

    async fn translate_text(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        self.counters.translate.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self.translate_all(request))
    }

    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        self.counters.batch.fetch_add(1, Ordering::SeqCst);
        if !self.supports(Capability::BatchTranslate) {
            return Err(ProviderError::Unsupported(format!(
                "{} does not support native batch translation",
                self.id
            )));
        }
        self.simulate().await?;
        Ok(self.translate_all(request))
    }

    fn validate_config(&self) -> ValidationReport {
        ValidationReport::valid(format!("Mock provider '{}'", self.id))
    }

    async fn terminate(&self) -> Result<(), ProviderError> {
        self.counters.terminate.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
