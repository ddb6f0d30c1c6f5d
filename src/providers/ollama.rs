use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::parsing;
use super::{Capability, Provider, ValidationReport};
use crate::app_config::ProviderConfig;
use crate::errors::ProviderError;
use crate::model::{DetectOptions, ImageData, TextArea, TranslationRequest, TranslationResponse};

const CAPABILITIES: &[Capability] = &[Capability::VisionDetect, Capability::Translate];

/// Ollama client for local vision models
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Provider configuration
    config: ProviderConfig,
    /// Set by `initialize`, cleared by `terminate`
    initialized: AtomicBool,
}

/// Chat message object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user or assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
    /// Base64-encoded images attached to the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Attach an image to the message
    pub fn with_image(mut self, bytes: &[u8]) -> Self {
        self.images.push(STANDARD.encode(bytes));
        self
    }
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Chat request for the Ollama API
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    stream: bool,
    /// How long to keep the model loaded in memory
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
}

impl ChatRequest {
    /// Create a new non-streaming chat request
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            options: None,
            stream: false,
            keep_alive: None,
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Set the maximum number of tokens to generate
    pub fn num_predict(mut self, num_predict: u32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).num_predict = Some(num_predict);
        self
    }

    /// Set how long the model stays loaded after the request
    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

/// Chat response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
}

/// Request that only adjusts model residency
#[derive(Debug, Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

/// Reassemble message content from a streamed (JSON lines) reply
fn collect_streamed_content(response_text: &str) -> Option<String> {
    let mut content = String::new();
    let mut saw_message = false;
    for line in response_text.lines().filter(|l| !l.trim().is_empty()) {
        if let Ok(chunk) = serde_json::from_str::<ChatResponse>(line) {
            content.push_str(&chunk.message.content);
            saw_message = true;
        }
    }
    saw_message.then_some(content)
}

impl Ollama {
    /// Create a new client from configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            config,
            initialized: AtomicBool::new(false),
        }
    }

    /// Registry factory
    pub fn factory(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(Arc::new(Self::new(config.clone())))
    }

    async fn ensure_initialized(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.initialize().await
    }

    /// Chat with the Ollama API and return the assistant's content
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parsing::retry_after_secs(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Ollama API error ({}): {}", status, error_text);
            return Err(parsing::error_from_status(status.as_u16(), retry_after, error_text));
        }

        let response_text = response.text().await?;
        match serde_json::from_str::<ChatResponse>(&response_text) {
            Ok(chat_response) => Ok(chat_response.message.content),
            // Some server versions stream even when asked not to.
            Err(e) => collect_streamed_content(&response_text).ok_or_else(|| {
                ProviderError::ParseError(format!("Failed to parse Ollama chat response: {}", e))
            }),
        }
    }

    /// Get the Ollama server version
    pub async fn version(&self) -> Result<String, ProviderError> {
        let url = format!("{}/api/version", self.base_url);
        let response: serde_json::Value = self.client.get(&url).send().await?.json().await?;

        response["version"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::ParseError("Invalid version format in response".to_string()))
    }
}

impl fmt::Debug for Ollama {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ollama")
            .field("base_url", &self.base_url)
            .field("model", &self.config.model)
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl Provider for Ollama {
    fn id(&self) -> &str {
        "ollama"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let report = self.validate_config();
        if !report.is_valid {
            return Err(ProviderError::InvalidConfig(report.message));
        }

        let version = self.version().await?;
        debug!("Connected to Ollama {} at {}", version, self.base_url);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn detect_text(
        &self,
        image: &ImageData,
        options: &DetectOptions,
    ) -> Result<Vec<TextArea>, ProviderError> {
        self.ensure_initialized().await?;

        let messages = vec![
            ChatMessage::system(parsing::detection_prompt(options)),
            ChatMessage::user("Find every text region in this image.").with_image(&image.bytes),
        ];
        let request = ChatRequest::new(&self.config.model, messages)
            .temperature(0.0)
            .num_predict(self.config.max_tokens);

        let content = self.chat(&request).await?;
        parsing::parse_text_areas(&content, self.id(), options)
    }

    async fn translate_text(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        self.ensure_initialized().await?;
        if request.is_empty() {
            return Ok(TranslationResponse::new(Vec::new()));
        }

        let messages = vec![
            ChatMessage::system(parsing::translation_prompt(request)),
            ChatMessage::user(parsing::translation_payload(request)?),
        ];
        let chat = ChatRequest::new(self.config.translation_model(), messages)
            .temperature(self.config.temperature)
            .num_predict(self.config.max_tokens);

        let content = self.chat(&chat).await?;
        let translations = parsing::parse_translations(&content, request.len())?;
        Ok(TranslationResponse::new(translations))
    }

    fn validate_config(&self) -> ValidationReport {
        if self.config.model.trim().is_empty() {
            return ValidationReport::invalid("A vision model must be configured for Ollama");
        }
        match Url::parse(&self.config.endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                ValidationReport::valid(format!("Ollama at {} with model {}", url, self.config.model))
            }
            Ok(url) => ValidationReport::invalid(format!("Unsupported endpoint scheme: {}", url.scheme())),
            Err(e) => ValidationReport::invalid(format!("Invalid endpoint '{}': {}", self.config.endpoint, e)),
        }
    }

    async fn terminate(&self) -> Result<(), ProviderError> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // Ask the server to unload the model; a failure here only costs memory.
        let url = format!("{}/api/generate", self.base_url);
        let unload = UnloadRequest {
            model: &self.config.model,
            keep_alive: 0,
        };
        if let Err(e) = self.client.post(&url).json(&unload).send().await {
            warn!("Failed to unload Ollama model {}: {}", self.config.model, e);
        }
        Ok(())
    }
}
