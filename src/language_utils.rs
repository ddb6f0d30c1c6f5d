use anyhow::{anyhow, Result};
use isolang::Language;

/// Language utilities for language tag handling
///
/// Translation targets are BCP 47-style tags ("fr", "zh-CN", "pt-BR"). Only
/// the primary subtag is checked against ISO 639; region and script subtags
/// are passed through to the providers untouched.

/// ISO 639-2/B codes that differ from their 639-2/T form
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Primary language subtag of a tag, lowercased ("zh-CN" -> "zh")
pub fn primary_subtag(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Resolve the primary subtag of a tag to an ISO language
fn resolve_language(tag: &str) -> Option<Language> {
    let primary = primary_subtag(tag);
    match primary.len() {
        2 => Language::from_639_1(&primary),
        3 => {
            let part2t = PART2B_TO_PART2T
                .iter()
                .find(|(b, _)| *b == primary)
                .map(|(_, t)| *t)
                .unwrap_or(primary.as_str());
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Validate a language tag such as "fr", "zh-CN" or "por"
pub fn validate_language_tag(tag: &str) -> Result<()> {
    let subtags: Vec<&str> = tag.trim().split(['-', '_']).collect();
    if subtags.iter().any(|s| s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric())) {
        return Err(anyhow!("Invalid language tag: {}", tag));
    }

    resolve_language(tag)
        .map(|_| ())
        .ok_or_else(|| anyhow!("Invalid language code: {}", tag))
}

/// Check if two tags name the same language, ignoring region and script
pub fn language_codes_match(tag1: &str, tag2: &str) -> bool {
    match (resolve_language(tag1), resolve_language(tag2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// English name of the language a tag refers to
pub fn get_language_name(tag: &str) -> Result<String> {
    let language = resolve_language(tag)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", tag))?;

    Ok(language.to_name().to_string())
}
