/*!
 * OCR fallback chain.
 *
 * The primary detector runs first. When it fails or finds nothing, the
 * fallback runs and its answer (or error) is final.
 */

use log::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::model::{DetectOptions, ImageData, TextArea};
use crate::providers::{Capability, Provider};

fn require_vision(provider: &Arc<dyn Provider>) -> Result<(), ProviderError> {
    if provider.supports(Capability::VisionDetect) {
        Ok(())
    } else {
        Err(ProviderError::Unsupported(format!(
            "{} cannot detect text in images",
            provider.id()
        )))
    }
}

/// Primary detector with an optional fallback
#[derive(Debug, Clone)]
pub struct FallbackDetector {
    primary: Arc<dyn Provider>,
    fallback: Option<Arc<dyn Provider>>,
}

impl FallbackDetector {
    /// Both providers must advertise `vision-detect`
    pub fn new(
        primary: Arc<dyn Provider>,
        fallback: Option<Arc<dyn Provider>>,
    ) -> Result<Self, ProviderError> {
        require_vision(&primary)?;
        if let Some(fallback) = &fallback {
            require_vision(fallback)?;
        }
        Ok(Self { primary, fallback })
    }

    pub fn primary(&self) -> &Arc<dyn Provider> {
        &self.primary
    }

    pub fn fallback(&self) -> Option<&Arc<dyn Provider>> {
        self.fallback.as_ref()
    }

    /// Detect by calling the providers directly
    pub async fn detect_with_fallback(
        &self,
        image: &ImageData,
        options: &DetectOptions,
    ) -> Result<Vec<TextArea>, ProviderError> {
        self.detect_via(|provider| async move { provider.detect_text(image, options).await })
            .await
    }

    /// Detect, routing each provider call through `dispatch`
    pub async fn detect_via<F, Fut, E>(&self, dispatch: F) -> Result<Vec<TextArea>, E>
    where
        F: Fn(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<Vec<TextArea>, E>>,
        E: Display,
    {
        let primary_result = dispatch(self.primary.clone()).await;

        let Some(fallback) = &self.fallback else {
            return primary_result;
        };

        match &primary_result {
            Ok(areas) if !areas.is_empty() => return primary_result,
            Ok(_) => debug!(
                "{} found no text, trying {}",
                self.primary.id(),
                fallback.id()
            ),
            Err(e) => warn!(
                "{} detection failed ({}), trying {}",
                self.primary.id(),
                e,
                fallback.id()
            ),
        }

        dispatch(fallback.clone()).await
    }

    /// Swap the primary, terminating the outgoing instance first
    pub async fn replace_primary(&mut self, primary: Arc<dyn Provider>) -> Result<(), ProviderError> {
        require_vision(&primary)?;
        terminate_quietly(&self.primary).await;
        self.primary = primary;
        Ok(())
    }

    /// Swap or remove the fallback, terminating the outgoing instance first
    pub async fn replace_fallback(
        &mut self,
        fallback: Option<Arc<dyn Provider>>,
    ) -> Result<(), ProviderError> {
        if let Some(fallback) = &fallback {
            require_vision(fallback)?;
        }
        if let Some(old) = self.fallback.take() {
            terminate_quietly(&old).await;
        }
        self.fallback = fallback;
        Ok(())
    }

    /// Release both providers
    pub async fn terminate_all(&self) {
        terminate_quietly(&self.primary).await;
        if let Some(fallback) = &self.fallback {
            terminate_quietly(fallback).await;
        }
    }
}

/// Terminate, logging failures; a provider that fails to shut down is still dropped
pub(crate) async fn terminate_quietly(provider: &Arc<dyn Provider>) {
    if let Err(e) = provider.terminate().await {
        warn!("Failed to terminate provider {}: {}", provider.id(), e);
    }
}
