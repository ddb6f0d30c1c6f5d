/*!
 * End-to-end tests for the application controller
 */

use std::fs;

use panelglot::app_config::ProviderConfig;
use panelglot::database::SqliteStore;
use panelglot::file_utils::FileManager;
use panelglot::{Controller, ProviderRegistry};

use crate::common;

fn controller() -> Controller {
    Controller::with_store(common::mock_config(), ProviderRegistry::with_builtin(), None).unwrap()
}

#[tokio::test]
async fn test_runFolder_withImages_shouldWriteTranslationFiles() {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let first = common::create_test_image(temp_dir.path(), "001.png", 64).unwrap();
    let second = common::create_test_image(temp_dir.path(), "002.webp", 96).unwrap();
    common::create_test_image(temp_dir.path(), "thumb.png", 8).unwrap();

    let controller = controller();
    tokio_test::assert_ok!(controller.initialize().await);
    let progress = controller
        .run_folder(temp_dir.path().to_path_buf(), false)
        .await
        .unwrap();

    assert_eq!(progress.processed, 2);
    assert_eq!(progress.failed, 0);

    for image in [&first, &second] {
        let output = FileManager::output_path_for(image);
        assert!(output.exists(), "missing {}", output.display());
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(json["target_language"], "fr");
        assert_eq!(json["areas"][0]["text"], "Hello");
        assert_eq!(json["areas"][0]["translation"], "[fr] Hello");
    }
    assert!(!FileManager::output_path_for(&temp_dir.path().join("thumb.png")).exists());

    controller.shutdown().await;
}

#[tokio::test]
async fn test_runFolder_withExistingOutputs_shouldSkipUnlessForced() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_image(temp_dir.path(), "001.png", 64).unwrap();
    common::create_test_image(temp_dir.path(), "002.png", 80).unwrap();
    let controller = controller();

    let first = controller.run_folder(temp_dir.path().to_path_buf(), false).await.unwrap();
    let skipped = controller.run_folder(temp_dir.path().to_path_buf(), false).await.unwrap();
    let dispatched = controller.orchestrator().stats().total;
    let forced = controller.run_folder(temp_dir.path().to_path_buf(), true).await.unwrap();

    assert_eq!(first.processed, 2);
    assert_eq!(skipped.total, 0);
    assert_eq!(forced.processed, 2);

    // The forced rerun is answered entirely from cache.
    let stats = controller.orchestrator().stats();
    assert_eq!(stats.total, dispatched);
    assert!(stats.cached >= 4);
}

#[tokio::test]
async fn test_runFolder_missingDirectory_shouldFail() {
    let temp_dir = common::create_temp_dir().unwrap();
    let controller = controller();

    tokio_test::assert_err!(controller.run_folder(temp_dir.path().join("nope"), false).await);
}

#[tokio::test]
async fn test_validateProviders_shouldReportEachConfiguredProvider() {
    let mut config = common::mock_config();
    config.providers = vec![
        ProviderConfig::new("mock"),
        ProviderConfig::new("openai"),
        ProviderConfig::new("openai")
            .with_api_key("sk-test")
            .with_endpoint("ftp://example.com"),
    ];
    let controller = Controller::with_store(config, ProviderRegistry::with_builtin(), None).unwrap();

    let checks = controller.validate_providers().await;

    assert_eq!(checks.len(), 3);
    assert!(checks[0].is_ok());
    assert!(!checks[1].is_ok());
    assert!(checks[1].report.message.contains("API key"));
    assert!(!checks[2].is_ok());
    assert!(checks[2].init_error.is_none());
}

#[tokio::test]
async fn test_withStore_unknownPrimary_shouldFail() {
    let mut config = common::mock_config();
    config.detection.provider = "tesseract".to_string();

    assert!(Controller::with_store(config, ProviderRegistry::with_builtin(), None).is_err());
}

#[tokio::test]
async fn test_cacheStats_andClear_withDurableStore() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_image(temp_dir.path(), "001.png", 64).unwrap();

    let mut config = common::mock_config();
    config.cache.durable = true;
    let store = SqliteStore::in_memory().unwrap();
    let controller = Controller::with_store(config, ProviderRegistry::with_builtin(), Some(store)).unwrap();
    controller.initialize().await.unwrap();
    controller.run_folder(temp_dir.path().to_path_buf(), false).await.unwrap();

    let (memory, durable) = controller.cache_stats().await.unwrap();
    assert_eq!(memory.entries, 2);
    let durable = durable.unwrap();
    assert_eq!(durable.entry_count, 2);
    assert_eq!(durable.queued_count, 0);

    let removed = controller.clear_cache().await.unwrap();
    assert_eq!(removed, 4);
    let (memory, durable) = controller.cache_stats().await.unwrap();
    assert_eq!(memory.entries, 0);
    assert_eq!(durable.unwrap().entry_count, 0);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_newForTest_shouldUseMockProvider() {
    let controller = Controller::new_for_test().unwrap();

    assert_eq!(controller.orchestrator().provider_id().await, "mock");
    assert!(controller.cache_stats().await.unwrap().1.is_none());
}

#[tokio::test]
async fn test_shutdown_shouldRejectLaterRequests() {
    let controller = controller();
    controller.shutdown().await;

    let error = controller
        .orchestrator()
        .detect_text(&common::sample_image("late.png", 1), &Default::default())
        .await
        .unwrap_err();

    assert_eq!(error.kind, panelglot::ErrorKind::Cancelled);
}
