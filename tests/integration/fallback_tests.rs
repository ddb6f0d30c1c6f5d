/*!
 * Integration tests for the OCR fallback chain behind the orchestrator
 */

use std::sync::Arc;

use panelglot::app_config::ProviderConfig;
use panelglot::cache::{CacheConfig, TieredCache};
use panelglot::errors::{ErrorKind, ProviderError};
use panelglot::providers::mock::MockProvider;
use panelglot::providers::{Capability, ProviderRegistry};
use panelglot::{BoundingBox, DetectOptions, RequestOrchestrator, TextArea};

use crate::common;

fn area(text: &str) -> TextArea {
    TextArea::new(BoundingBox::new(4.0, 4.0, 50.0, 20.0), text, "mock")
}

fn orchestrator(primary: Arc<MockProvider>, fallback: Option<Arc<MockProvider>>) -> RequestOrchestrator {
    RequestOrchestrator::new(
        primary,
        fallback.map(|f| f as Arc<dyn panelglot::Provider>),
        TieredCache::new(CacheConfig::default()),
        common::fast_config(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_detectText_primaryFindsNothing_shouldReturnFallbackRegions() {
    let primary = Arc::new(MockProvider::working().with_detection(Vec::new()));
    let fallback = Arc::new(
        MockProvider::working()
            .with_id("backup")
            .with_detection(vec![area("SFX"), area("Hi")]),
    );
    let orchestrator = orchestrator(primary.clone(), Some(fallback.clone()));

    let areas = orchestrator
        .detect_text(&common::sample_image("page.png", 1), &DetectOptions::default())
        .await
        .unwrap();

    assert_eq!(areas.len(), 2);
    assert!(areas.iter().all(|a| a.detection_method == "backup"));
    assert_eq!(primary.detect_calls(), 1);
    assert_eq!(fallback.detect_calls(), 1);
}

#[tokio::test]
async fn test_detectText_primaryHasRegions_shouldNotCallFallback() {
    let primary = Arc::new(MockProvider::working());
    let fallback = Arc::new(MockProvider::working().with_id("backup"));
    let orchestrator = orchestrator(primary, Some(fallback.clone()));

    let areas = orchestrator
        .detect_text(&common::sample_image("page.png", 1), &DetectOptions::default())
        .await
        .unwrap();

    assert_eq!(areas[0].detection_method, "mock");
    assert_eq!(fallback.detect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_detectText_primaryExhaustsRetries_shouldFallBackWithItsOwnRetries() {
    let primary = Arc::new(MockProvider::failing());
    let fallback = Arc::new(MockProvider::working().with_id("backup").with_failures(vec![
        ProviderError::ConnectionError("reset".into()),
    ]));
    let orchestrator = orchestrator(primary.clone(), Some(fallback.clone()));

    let areas = orchestrator
        .detect_text(&common::sample_image("page.png", 1), &DetectOptions::default())
        .await
        .unwrap();

    assert_eq!(areas[0].detection_method, "backup");
    assert_eq!(primary.detect_calls(), 4);
    assert_eq!(fallback.detect_calls(), 2);
    assert_eq!(orchestrator.stats().retried, 4);
    assert_eq!(orchestrator.stats().success, 1);
}

#[tokio::test(start_paused = true)]
async fn test_detectText_bothFail_shouldReportFallbackError() {
    let primary = Arc::new(MockProvider::failing());
    let fallback = Arc::new(MockProvider::working().with_id("backup").with_failures(vec![
        ProviderError::AuthenticationError("bad key".into()),
    ]));
    let orchestrator = orchestrator(primary, Some(fallback));

    let error = orchestrator
        .detect_text(&common::sample_image("page.png", 1), &DetectOptions::default())
        .await
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::Auth);
    assert_eq!(error.attempts, 1);
    assert_eq!(orchestrator.stats().failed, 1);
}

#[tokio::test]
async fn test_detectText_fallbackResult_shouldBeCached() {
    let primary = Arc::new(MockProvider::working().with_detection(Vec::new()));
    let fallback = Arc::new(MockProvider::working().with_id("backup"));
    let orchestrator = orchestrator(primary.clone(), Some(fallback.clone()));
    let image = common::sample_image("page.png", 5);

    orchestrator.detect_text(&image, &DetectOptions::default()).await.unwrap();
    orchestrator.detect_text(&image, &DetectOptions::default()).await.unwrap();

    assert_eq!(primary.detect_calls(), 1);
    assert_eq!(fallback.detect_calls(), 1);
}

#[tokio::test]
async fn test_setFallback_shouldInstallAndLaterRemoveFallback() {
    let primary = Arc::new(MockProvider::working().with_detection(Vec::new()));
    let orchestrator = orchestrator(primary, None);
    let registry = ProviderRegistry::with_builtin();

    let mut backup = ProviderConfig::new("mock");
    backup.model = "registry-backup".to_string();
    orchestrator.set_fallback(&registry, Some(&backup)).await.unwrap();

    let areas = orchestrator
        .detect_text(&common::sample_image("a.png", 1), &DetectOptions::default())
        .await
        .unwrap();
    assert_eq!(areas[0].detection_method, "registry-backup");
    assert_eq!(orchestrator.generation().await, 1);

    orchestrator.set_fallback(&registry, None).await.unwrap();
    let areas = orchestrator
        .detect_text(&common::sample_image("b.png", 2), &DetectOptions::default())
        .await
        .unwrap();
    assert!(areas.is_empty());
}

#[tokio::test]
async fn test_setFallback_afterCachedEmptyResult_shouldConsultNewFallback() {
    let primary = Arc::new(MockProvider::working().with_detection(Vec::new()));
    let orchestrator = orchestrator(primary.clone(), None);
    let registry = ProviderRegistry::with_builtin();
    let image = common::sample_image("page.png", 8);

    let before = orchestrator.detect_text(&image, &DetectOptions::default()).await.unwrap();
    assert!(before.is_empty());

    let mut backup = ProviderConfig::new("mock");
    backup.model = "late-backup".to_string();
    orchestrator.set_fallback(&registry, Some(&backup)).await.unwrap();

    let after = orchestrator.detect_text(&image, &DetectOptions::default()).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].detection_method, "late-backup");
    assert_eq!(primary.detect_calls(), 2);
    assert_eq!(orchestrator.stats().cached, 0);

    // Without the fallback the earlier empty answer is valid again.
    orchestrator.set_fallback(&registry, None).await.unwrap();
    let again = orchestrator.detect_text(&image, &DetectOptions::default()).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(primary.detect_calls(), 2);
    assert_eq!(orchestrator.stats().cached, 1);
}

#[tokio::test]
async fn test_new_withTranslateOnlyFallback_shouldBeRejected() {
    let fallback: Arc<dyn panelglot::Provider> =
        Arc::new(MockProvider::working().with_capabilities(&[Capability::Translate]));

    let result = RequestOrchestrator::new(
        Arc::new(MockProvider::working()),
        Some(fallback),
        TieredCache::new(CacheConfig::default()),
        common::fast_config(),
    );

    let error = result.unwrap_err();
    assert_eq!(error.operation, "new");
    assert!(error.message.contains("cannot detect text"));
}
