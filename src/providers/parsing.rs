/*!
 * Prompt construction and response parsing shared by the model-backed
 * providers.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::errors::ProviderError;
use crate::language_utils;
use crate::model::{BoundingBox, DetectOptions, TextArea, TextType, TranslationRequest};

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fenced JSON pattern is valid")
});

/// Region as models describe it; either explicit fields or a `bbox` array
#[derive(Debug, Deserialize)]
struct RawTextArea {
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    bbox: Option<[f32; 4]>,
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default, rename = "type")]
    text_type: Option<String>,
    #[serde(default)]
    order: Option<u32>,
}

impl RawTextArea {
    fn bounds(&self) -> Option<BoundingBox> {
        if let Some([x, y, width, height]) = self.bbox {
            return Some(BoundingBox::new(x, y, width, height));
        }
        Some(BoundingBox::new(self.x?, self.y?, self.width?, self.height?))
    }
}

/// Wrapper some models put around the list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AreaList {
    Bare(Vec<RawTextArea>),
    Wrapped { areas: Vec<RawTextArea> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranslationList {
    Bare(Vec<String>),
    Wrapped { translations: Vec<String> },
}

/// System prompt for text detection
pub fn detection_prompt(options: &DetectOptions) -> String {
    let language_hint = options
        .source_language
        .as_deref()
        .and_then(|tag| language_utils::get_language_name(tag).ok())
        .map(|name| format!(" The text is expected to be in {}.", name))
        .unwrap_or_default();

    format!(
        "You locate and transcribe text in comic and manga images.{} \
         Reply with only a JSON array. Each element is an object with the fields \
         x, y, width, height (pixels), text, confidence (0 to 1), \
         type (one of dialogue, narration, sound_effect, other) and order \
         (reading order starting at 0). Reply with [] when there is no text.",
        language_hint
    )
}

/// System prompt for translation
pub fn translation_prompt(request: &TranslationRequest) -> String {
    let target = language_utils::get_language_name(&request.target_language)
        .unwrap_or_else(|_| request.target_language.clone());
    let source = request
        .source_language
        .as_deref()
        .and_then(|tag| language_utils::get_language_name(tag).ok())
        .map(|name| format!(" from {}", name))
        .unwrap_or_default();
    let context = request
        .context
        .as_deref()
        .map(|c| format!(" Context: {}", c))
        .unwrap_or_default();

    format!(
        "You are a professional comic translator. Translate each string of the JSON array{} \
         to {} ({}). Keep the tone and keep sound effects short.{} \
         Reply with only a JSON array of {} strings in the same order.",
        source,
        target,
        request.target_language,
        context,
        request.len()
    )
}

/// User message carrying the texts to translate
pub fn translation_payload(request: &TranslationRequest) -> Result<String, ProviderError> {
    serde_json::to_string(&request.texts)
        .map_err(|e| ProviderError::ParseError(format!("Failed to encode texts: {}", e)))
}

/// Extract the JSON document from model output, tolerating code fences and prose
pub fn extract_json(content: &str) -> Option<&str> {
    if let Some(captures) = FENCED_JSON.captures(content) {
        return captures.get(1).map(|m| m.as_str());
    }

    let start = content.find(['[', '{'])?;
    let end = content.rfind([']', '}'])?;
    (end >= start).then(|| &content[start..=end])
}

/// Parse detected regions from model output
pub fn parse_text_areas(
    content: &str,
    detection_method: &str,
    options: &DetectOptions,
) -> Result<Vec<TextArea>, ProviderError> {
    let json = extract_json(content)
        .ok_or_else(|| ProviderError::ParseError("No JSON found in detection response".to_string()))?;

    let raw = match serde_json::from_str::<AreaList>(json)
        .map_err(|e| ProviderError::ParseError(format!("Invalid detection JSON: {}", e)))?
    {
        AreaList::Bare(areas) | AreaList::Wrapped { areas } => areas,
    };

    let mut areas = Vec::with_capacity(raw.len());
    for (index, region) in raw.into_iter().enumerate() {
        let bounds = region
            .bounds()
            .filter(BoundingBox::is_well_formed)
            .ok_or_else(|| {
                ProviderError::ParseError(format!("Malformed geometry for region {}", index))
            })?;

        let text = region.text.trim();
        if text.is_empty() {
            continue;
        }

        let confidence = region.confidence.unwrap_or(1.0).clamp(0.0, 1.0);
        if confidence < options.min_confidence {
            continue;
        }

        let text_type = region
            .text_type
            .as_deref()
            .and_then(|t| t.parse::<TextType>().ok())
            .unwrap_or_default();

        areas.push(
            TextArea::new(bounds, text, detection_method)
                .with_confidence(confidence)
                .with_type(text_type)
                .with_reading_order(region.order.unwrap_or(index as u32)),
        );
    }

    // Stable sort keeps model order for ties; then renumber densely.
    areas.sort_by_key(|a| a.reading_order);
    for (order, area) in areas.iter_mut().enumerate() {
        area.reading_order = order as u32;
    }

    Ok(areas)
}

/// Parse translations and check they line up with the request
pub fn parse_translations(content: &str, expected: usize) -> Result<Vec<String>, ProviderError> {
    let json = extract_json(content).ok_or_else(|| {
        ProviderError::ParseError("No JSON found in translation response".to_string())
    })?;

    let translations = match serde_json::from_str::<TranslationList>(json)
        .map_err(|e| ProviderError::ParseError(format!("Invalid translation JSON: {}", e)))?
    {
        TranslationList::Bare(list) | TranslationList::Wrapped { translations: list } => list,
    };

    if translations.len() != expected {
        return Err(ProviderError::ParseError(format!(
            "Expected {} translations, got {}",
            expected,
            translations.len()
        )));
    }

    Ok(translations)
}

/// Map a non-success HTTP response onto a provider error
pub fn error_from_status(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationError(body),
        429 => ProviderError::RateLimitExceeded {
            message: body,
            retry_after_secs: retry_after,
        },
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Read `Retry-After` as whole seconds
pub fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
