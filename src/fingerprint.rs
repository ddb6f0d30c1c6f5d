/*!
 * Request fingerprints.
 *
 * A fingerprint is a stable, non-cryptographic xxh3 hash over the fields of a
 * request that change its answer. It doubles as the cache key and the
 * in-flight deduplication key. Collisions only cost a stale answer.
 */

use std::fmt;
use xxhash_rust::xxh3::Xxh3;

use crate::model::{DetectOptions, TranslateOptions};

/// 64-bit request fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Fingerprint of a text detection request
    ///
    /// The fallback takes part because an empty primary answer is only final
    /// when no fallback is installed.
    pub fn detection(
        provider_id: &str,
        fallback_id: Option<&str>,
        image_digest: u64,
        options: &DetectOptions,
    ) -> Self {
        FingerprintBuilder::new("detect_text")
            .field(provider_id.as_bytes())
            .optional(fallback_id)
            .field(&image_digest.to_le_bytes())
            .optional(options.source_language.as_deref())
            .field(&options.min_confidence.to_bits().to_le_bytes())
            .finish()
    }

    /// Fingerprint of a single-text translation
    pub fn translation(
        provider_id: &str,
        text: &str,
        target_language: &str,
        options: &TranslateOptions,
    ) -> Self {
        FingerprintBuilder::new("translate_text")
            .field(provider_id.as_bytes())
            .field(text.as_bytes())
            .field(target_language.to_lowercase().as_bytes())
            .optional(options.source_language.as_deref())
            .optional(options.context.as_deref())
            .finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Incremental fingerprint construction
///
/// Every field is length-prefixed so that ("ab", "c") and ("a", "bc") hash
/// differently.
pub struct FingerprintBuilder {
    hasher: Xxh3,
}

impl FingerprintBuilder {
    pub fn new(operation: &str) -> Self {
        let mut builder = Self { hasher: Xxh3::new() };
        builder.push(operation.as_bytes());
        builder
    }

    pub fn field(mut self, bytes: &[u8]) -> Self {
        self.push(bytes);
        self
    }

    pub fn optional(mut self, value: Option<&str>) -> Self {
        match value {
            Some(value) => {
                self.hasher.update(&[1]);
                self.push(value.as_bytes());
            }
            None => self.hasher.update(&[0]),
        }
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.digest())
    }

    fn push(&mut self, bytes: &[u8]) {
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }
}
