/*!
 * Value types exchanged between the orchestrator, the providers and the
 * batch processor.
 */

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned region of an image, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Finite, non-negative origin and strictly positive size
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// Semantic classification of a detected text region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
    Dialogue,
    Narration,
    SoundEffect,
    #[default]
    Other,
}

impl TextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue",
            Self::Narration => "narration",
            Self::SoundEffect => "sound_effect",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Lenient: models spell these in many ways, unknown labels become Other.
impl FromStr for TextType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Ok(match normalized.as_str() {
            "dialogue" | "dialog" | "speech" | "bubble" => Self::Dialogue,
            "narration" | "caption" | "narrative" => Self::Narration,
            "sound_effect" | "sfx" | "onomatopoeia" | "sound" => Self::SoundEffect,
            _ => Self::Other,
        })
    }
}

/// A detected text region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextArea {
    /// Region geometry
    pub bounds: BoundingBox,
    /// Recognized text
    pub text: String,
    /// Recognition confidence in [0, 1]
    pub confidence: f32,
    /// Semantic type
    pub text_type: TextType,
    /// Reading order index, 0-based
    pub reading_order: u32,
    /// Which engine produced this region
    pub detection_method: String,
}

impl TextArea {
    pub fn new(bounds: BoundingBox, text: impl Into<String>, detection_method: impl Into<String>) -> Self {
        Self {
            bounds,
            text: text.into(),
            confidence: 1.0,
            text_type: TextType::Other,
            reading_order: 0,
            detection_method: detection_method.into(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_type(mut self, text_type: TextType) -> Self {
        self.text_type = text_type;
        self
    }

    pub fn with_reading_order(mut self, reading_order: u32) -> Self {
        self.reading_order = reading_order;
        self
    }
}

/// Image payload handed to detectors. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Host-side identifier (path, URL, element id)
    pub id: String,
    /// Raw encoded image bytes
    pub bytes: Bytes,
    /// MIME type of `bytes`
    pub mime_type: String,
}

impl ImageData {
    pub fn new(id: impl Into<String>, bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Content digest; two images with equal bytes share it regardless of id
    pub fn digest(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Guess a MIME type from a file extension
    pub fn mime_for_extension(extension: &str) -> &'static str {
        match extension.to_lowercase().as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            _ => "application/octet-stream",
        }
    }
}

/// Options that change what a detector returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectOptions {
    /// Language expected in the image, if known
    pub source_language: Option<String>,
    /// Regions below this confidence are discarded
    pub min_confidence: f32,
}

impl DetectOptions {
    pub fn with_source_language(mut self, language: impl Into<String>) -> Self {
        self.source_language = Some(language.into());
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

/// Options that change how texts are translated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateOptions {
    /// Source language, when not auto-detected
    pub source_language: Option<String>,
    /// Free-text context (page summary, speaker, etc.)
    pub context: Option<String>,
}

/// A translation request handed to a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub texts: Vec<String>,
    pub target_language: String,
    pub source_language: Option<String>,
    pub context: Option<String>,
}

impl TranslationRequest {
    pub fn new(texts: Vec<String>, target_language: impl Into<String>, options: &TranslateOptions) -> Self {
        Self {
            texts,
            target_language: target_language.into(),
            source_language: options.source_language.clone(),
            context: options.context.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// Provider answer to a `TranslationRequest`, positionally aligned with it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub translations: Vec<String>,
    pub confidence: Option<f32>,
}

impl TranslationResponse {
    pub fn new(translations: Vec<String>) -> Self {
        Self {
            translations,
            confidence: None,
        }
    }
}
