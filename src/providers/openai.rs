use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error};
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

const CAPABILITIES: &[Capability] = &[
    Capability::VisionDetect,
    Capability::Translate,
    Capability::BatchTranslate,
];

/// OpenAI-compatible chat completions client with vision support
pub struct OpenAI {
    /// HTTP client for API requests
    client: Client,
    /// Provider configuration
    config: ProviderConfig,
    /// Set by `initialize`, cleared by `terminate`
    initialized: AtomicBool,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Chat message
#[derive(Debug, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Message content: plain text or multimodal parts
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal message
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl OpenAIRequest {
    /// Create a new request
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Add a system message
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        });
        self
    }

    /// Add a user message
    pub fn user(mut self, content: MessageContent) -> Self {
        self.messages.push(OpenAIMessage {
            role: "user".to_string(),
            content,
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion token limit
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl OpenAI {
    /// Create a new client from configuration
    pub fn new(config: ProviderConfig) -> Self {
        Self {
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

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    async fn ensure_initialized(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.initialize().await
    }

    /// Send a chat completion request and return the first message content
    pub async fn complete(&self, request: &OpenAIRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parsing::retry_after_secs(response.headers());
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("OpenAI API error ({}): {}", status, error_text);
            return Err(parsing::error_from_status(status.as_u16(), retry_after, error_text));
        }

        let body: OpenAIResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::ParseError("Response contained no message content".to_string()))
    }

    async fn request_translations(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        self.ensure_initialized().await?;
        if request.is_empty() {
            return Ok(TranslationResponse::new(Vec::new()));
        }

        let chat = OpenAIRequest::new(self.config.translation_model())
            .system(parsing::translation_prompt(request))
            .user(MessageContent::Text(parsing::translation_payload(request)?))
            .temperature(self.config.temperature)
            .max_tokens(self.config.max_tokens);

        let content = self.complete(&chat).await?;
        let translations = parsing::parse_translations(&content, request.len())?;
        Ok(TranslationResponse::new(translations))
    }
}

impl fmt::Debug for OpenAI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAI")
            .field("endpoint", &self.config.endpoint)
            .field("model", &self.config.model)
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl Provider for OpenAI {
    fn id(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    async fn initialize(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::AuthenticationError(
                "OpenAI API key is not configured".to_string(),
            ));
        }

        let report = self.validate_config();
        if !report.is_valid {
            return Err(ProviderError::InvalidConfig(report.message));
        }

        self.initialized.store(true, Ordering::Release);
        debug!("OpenAI provider ready ({})", self.config.model);
        Ok(())
    }

    async fn detect_text(
        &self,
        image: &ImageData,
        options: &DetectOptions,
    ) -> Result<Vec<TextArea>, ProviderError> {
        self.ensure_initialized().await?;

        let data_url = format!("data:{};base64,{}", image.mime_type, STANDARD.encode(&image.bytes));
        let chat = OpenAIRequest::new(&self.config.model)
            .system(parsing::detection_prompt(options))
            .user(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Find every text region in this image.".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]))
            .temperature(0.0)
            .max_tokens(self.config.max_tokens);

        let content = self.complete(&chat).await?;
        parsing::parse_text_areas(&content, self.id(), options)
    }

    async fn translate_text(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        self.request_translations(request).await
    }

    async fn translate_batch(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationResponse, ProviderError> {
        // The chat API takes the whole list in one message; no splitting needed.
        self.request_translations(request).await
    }

    fn validate_config(&self) -> ValidationReport {
        if self.config.api_key.trim().is_empty() {
            return ValidationReport::invalid("API key is required for OpenAI");
        }
        if self.config.model.trim().is_empty() {
            return ValidationReport::invalid("A vision-capable model must be configured");
        }
        match Url::parse(&self.config.endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                ValidationReport::valid(format!("OpenAI endpoint {} with model {}", url, self.config.model))
            }
            Ok(url) => ValidationReport::invalid(format!("Unsupported endpoint scheme: {}", url.scheme())),
            Err(e) => ValidationReport::invalid(format!("Invalid endpoint '{}': {}", self.config.endpoint, e)),
        }
    }

    async fn terminate(&self) -> Result<(), ProviderError> {
        if self.initialized.swap(false, Ordering::AcqRel) {
            debug!("OpenAI provider terminated");
        }
        Ok(())
    }
}
