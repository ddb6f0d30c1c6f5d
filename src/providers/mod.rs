/*!
 * Provider implementations for text detection and translation engines.
 *
 * This module defines the capability contract every engine implements and
 * the registry that constructs engines from configuration:
 * - OpenAI: OpenAI-compatible remote vision/chat models
 * - Ollama: Local vision models served by Ollama
 * - Mock: Scripted provider for tests and dry runs
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::model::{DetectOptions, ImageData, TextArea, TranslationRequest, TranslationResponse};

pub mod mock;
pub mod ollama;
pub mod openai;
mod parsing;

/// Capability tags a provider advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Can locate and read text in images
    VisionDetect,
    /// Can translate a list of texts
    Translate,
    /// Can translate many texts in one native request
    BatchTranslate,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VisionDetect => "vision-detect",
            Self::Translate => "translate",
            Self::BatchTranslate => "batch-translate",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a pre-flight configuration check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub message: String,
}

impl ValidationReport {
    pub fn valid(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

/// Common trait for all detection/translation engines
///
/// Implementations are shared behind `Arc<dyn Provider>` and called
/// concurrently, so all methods take `&self`.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Registry identifier of this provider kind
    fn id(&self) -> &str;

    /// Fixed set of capabilities, queried before dispatch
    fn capabilities(&self) -> &[Capability];

    /// Whether a capability is advertised
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Idempotent setup
    ///
    /// # Returns
    /// * `Result<(), ProviderError>` - Ok when ready, or a classified error
    ///   when credentials or configuration are unusable
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Locate and read text regions in an image
    ///
    /// Never returns malformed geometry; a malformed region is an error.
    async fn detect_text(
        &self,
        image: &ImageData,
        options: &DetectOptions,
    ) -> Result<Vec<TextArea>, ProviderError>;

    /// Translate texts; the response is positionally aligned with the request
    async fn translate_text(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError>;

    /// Native batch translation, only called when `BatchTranslate` is advertised
    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        let _ = request;
        Err(ProviderError::Unsupported(format!(
            "{} does not support native batch translation",
            self.id()
        )))
    }

    /// Side-effect-free configuration check
    fn validate_config(&self) -> ValidationReport;

    /// Release held resources; safe to call more than once
    async fn terminate(&self) -> Result<(), ProviderError>;
}

/// Constructs a provider purely from its configuration
pub type ProviderFactory = fn(&ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError>;

/// Explicit registry of provider kinds, built once at startup
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in provider kinds
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("openai", openai::OpenAI::factory);
        registry.register("ollama", ollama::Ollama::factory);
        registry.register("mock", mock::MockProvider::factory);
        registry
    }

    /// Register a provider kind, replacing any previous factory for `id`
    pub fn register(&mut self, id: &str, factory: ProviderFactory) -> Option<ProviderFactory> {
        self.factories.insert(id.to_lowercase(), factory)
    }

    /// Whether a provider kind is registered
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(&id.to_lowercase())
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Construct a provider from its configuration
    pub fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        let factory = self
            .factories
            .get(&config.provider_type.to_lowercase())
            .ok_or_else(|| {
                ProviderError::InvalidConfig(format!(
                    "Unknown provider type '{}', expected one of: {}",
                    config.provider_type,
                    self.ids().join(", ")
                ))
            })?;
        factory(config)
    }
}

impl Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}
