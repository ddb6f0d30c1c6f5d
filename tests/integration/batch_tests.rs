/*!
 * Integration tests for the batch state machine
 */

use std::collections::HashMap;
use std::sync::Arc;

use panelglot::batch::{BatchOptions, DirectoryTargets, ImageTarget};
use panelglot::errors::{BatchError, ErrorKind, ProviderError};
use panelglot::providers::mock::MockProvider;
use panelglot::{BatchEvent, BatchProcessor, BatchStatus};

use crate::common;

/// Compact label for each event, so runs can be compared as sequences
fn label(event: &BatchEvent) -> String {
    match event {
        BatchEvent::Started { total, .. } => format!("started:{}", total),
        BatchEvent::TargetCompleted(outcome) => format!("done:{}", outcome.target_id),
        BatchEvent::TargetFailed { target_id, .. } => format!("failed:{}", target_id),
        BatchEvent::BatchFinished { index, .. } => format!("batch:{}", index),
        BatchEvent::Paused(progress) => format!("paused:{}", progress.processed),
        BatchEvent::Resumed(progress) => format!("resumed:{}", progress.processed),
        BatchEvent::Completed(progress) => format!("completed:{}", progress.processed),
        BatchEvent::Cancelled(progress) => format!("cancelled:{}", progress.processed),
    }
}

fn processor(mock: Arc<MockProvider>, batch_size: usize) -> BatchProcessor {
    let orchestrator = common::orchestrator_with(mock, common::fast_config());
    BatchProcessor::new(orchestrator, BatchOptions::new("fr").with_batch_size(batch_size))
}

#[tokio::test]
async fn test_run_pauseAndResume_shouldProcessEveryTargetExactlyOnce() {
    common::init_test_logging();
    let mock = Arc::new(MockProvider::working());
    let processor = processor(mock.clone(), 2);
    let targets = common::sample_targets(10);
    let control = processor.control();
    let pauser = control.clone();
    let mut events = Vec::new();

    let resumer = async {
        while control.status() != BatchStatus::Paused {
            tokio::task::yield_now().await;
        }
        assert_eq!(control.progress().processed, 4);
        control.resume();
    };

    let (result, _) = tokio::join!(
        processor.run(&targets, |event| {
            if let BatchEvent::BatchFinished { index: 1, .. } = event {
                pauser.pause();
            }
            events.push(label(event));
        }),
        resumer
    );

    let progress = result.unwrap();
    assert_eq!(progress.processed, 10);
    assert_eq!(control.status(), BatchStatus::Completed);
    assert_eq!(mock.detect_calls(), 10);

    let mut completions: HashMap<&str, usize> = HashMap::new();
    for event in &events {
        if let Some(id) = event.strip_prefix("done:") {
            *completions.entry(id).or_default() += 1;
        }
    }
    assert_eq!(completions.len(), 10);
    assert!(completions.values().all(|count| *count == 1));

    let paused_at = events.iter().position(|e| e == "paused:4").unwrap();
    assert_eq!(events[paused_at - 1], "batch:1");
    assert_eq!(events[paused_at + 1], "resumed:4");
    assert_eq!(events.last().unwrap(), "completed:10");
}

#[tokio::test]
async fn test_run_cancelAfterSecondBatch_shouldStopBeforeThirdBatch() {
    let mock = Arc::new(MockProvider::working());
    let processor = processor(mock.clone(), 5);
    let targets = common::sample_targets(25);
    let control = processor.control();
    let mut events = Vec::new();

    let progress = processor
        .run(&targets, |event| {
            if let BatchEvent::BatchFinished { index: 1, .. } = event {
                control.cancel();
            }
            events.push(label(event));
        })
        .await
        .unwrap();

    assert_eq!(progress.processed, 10);
    assert_eq!(progress.remaining(), 15);
    assert_eq!(control.status(), BatchStatus::Cancelled);
    assert_eq!(mock.detect_calls(), 10);
    assert!(!events.iter().any(|e| e == "batch:2"));
    assert_eq!(events.last().unwrap(), "cancelled:10");
}

#[tokio::test]
async fn test_run_cancelWhilePaused_shouldWakeAndFinishCancelled() {
    let mock = Arc::new(MockProvider::working());
    let processor = processor(mock.clone(), 5);
    let targets = common::sample_targets(15);
    let control = processor.control();
    let pauser = control.clone();

    let canceller = async {
        while control.status() != BatchStatus::Paused {
            tokio::task::yield_now().await;
        }
        control.cancel();
    };

    let (result, _) = tokio::join!(
        processor.run(&targets, |event| {
            if let BatchEvent::BatchFinished { index: 0, .. } = event {
                pauser.pause();
            }
        }),
        canceller
    );

    assert_eq!(result.unwrap().processed, 5);
    assert_eq!(control.status(), BatchStatus::Cancelled);
    assert_eq!(mock.detect_calls(), 5);
}

#[tokio::test]
async fn test_run_pauseAfterLastBatch_shouldStillComplete() {
    let processor = processor(Arc::new(MockProvider::working()), 3);
    let targets = common::sample_targets(3);
    let control = processor.control();

    let progress = processor
        .run(&targets, |event| {
            if let BatchEvent::BatchFinished { .. } = event {
                control.pause();
            }
        })
        .await
        .unwrap();

    assert_eq!(progress.processed, 3);
    assert_eq!(control.status(), BatchStatus::Completed);
}

#[tokio::test]
async fn test_run_failedTarget_shouldBeRecordedAndRunContinues() {
    let mock = Arc::new(
        MockProvider::working().with_failures(vec![ProviderError::AuthenticationError("expired".into())]),
    );
    let processor = processor(mock.clone(), 2);
    let targets = common::sample_targets(4);
    let mut failures = Vec::new();

    let progress = processor
        .run(&targets, |event| {
            if let BatchEvent::TargetFailed { error, .. } = event {
                failures.push(error.kind);
            }
        })
        .await
        .unwrap();

    assert_eq!(failures, vec![ErrorKind::Auth]);
    assert_eq!(progress.processed, 4);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.succeeded(), 3);
    assert_eq!(processor.control().status(), BatchStatus::Completed);
}

#[tokio::test]
async fn test_run_outcomes_shouldPairRegionsWithTranslations() {
    let processor = processor(Arc::new(MockProvider::working()), 5);
    let targets = common::sample_targets(1);
    let mut outcomes = Vec::new();

    processor
        .run(&targets, |event| {
            if let BatchEvent::TargetCompleted(outcome) = event {
                outcomes.push(outcome.clone());
            }
        })
        .await
        .unwrap();

    let outcome = &outcomes[0];
    assert_eq!(outcome.target_id, "page-00");
    assert_eq!(outcome.target_language, "fr");
    assert_eq!(outcome.areas[0].area.text, "Hello");
    assert_eq!(outcome.areas[0].translation, "[fr] Hello");
}

#[tokio::test]
async fn test_run_onDirectory_shouldSkipTinyFilesAndReadImages() {
    let temp_dir = common::create_temp_dir().unwrap();
    common::create_test_image(temp_dir.path(), "001.png", 128).unwrap();
    common::create_test_image(temp_dir.path(), "002.jpg", 256).unwrap();
    common::create_test_image(temp_dir.path(), "icon.png", 4).unwrap();
    common::create_test_image(temp_dir.path(), "notes.txt", 512).unwrap();

    let mock = Arc::new(MockProvider::working());
    let processor = processor(mock.clone(), 5);
    let source = DirectoryTargets::new(temp_dir.path()).with_min_image_bytes(16);
    let mut completed = Vec::new();

    let progress = processor
        .run(&source, |event| {
            if let BatchEvent::TargetCompleted(outcome) = event {
                completed.push(outcome.target_id.clone());
            }
        })
        .await
        .unwrap();

    assert_eq!(progress.total, 2);
    assert_eq!(completed.len(), 2);
    assert_eq!(mock.detect_calls(), 2);
}

#[tokio::test]
async fn test_run_missingDirectory_shouldFailAndStayIdle() {
    let temp_dir = common::create_temp_dir().unwrap();
    let processor = processor(Arc::new(MockProvider::working()), 5);
    let source = DirectoryTargets::new(temp_dir.path().join("missing"));

    let error = processor.run(&source, |_| {}).await.unwrap_err();

    assert!(matches!(error, BatchError::Enumeration(_)));
    assert_eq!(processor.control().status(), BatchStatus::Idle);
}

#[tokio::test]
async fn test_run_unreadableFile_shouldFailOnlyThatTarget() {
    let temp_dir = common::create_temp_dir().unwrap();
    let present = common::create_test_image(temp_dir.path(), "here.png", 64).unwrap();
    let targets = vec![
        ImageTarget::file(present),
        ImageTarget::file(temp_dir.path().join("gone.png")),
    ];
    let processor = processor(Arc::new(MockProvider::working()), 5);
    let mut failed_ops = Vec::new();

    let progress = processor
        .run(&targets, |event| {
            if let BatchEvent::TargetFailed { error, .. } = event {
                failed_ops.push(error.operation.clone());
            }
        })
        .await
        .unwrap();

    assert_eq!(progress.failed, 1);
    assert_eq!(failed_ops, vec!["load_image".to_string()]);
}
