/*!
 * Batch processing state machine.
 *
 * A run walks its targets in fixed-width batches:
 *
 * `Idle -> Processing <-> Paused -> {Completed, Cancelled}`
 *
 * Targets inside a batch run concurrently and all settle before the next
 * batch starts. Pause and cancel are observed between batches, so the batch
 * in progress always finishes and no target is dispatched twice.
 */

use futures::future::join_all;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app_config::Config;
use crate::errors::{BatchError, ErrorKind, OrchestratorError};
use crate::model::{DetectOptions, TextArea, TranslateOptions};
use crate::orchestrator::RequestOrchestrator;

pub mod progress;
pub mod targets;

pub use progress::BatchProgress;
pub use targets::{DirectoryTargets, ImageTarget, TargetSource};

/// Default number of targets processed together
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Lifecycle state of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Idle,
    Processing,
    Paused,
    Completed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed or cancelled
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a run does to each target
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub target_language: String,
    pub detect: DetectOptions,
    pub translate: TranslateOptions,
}

impl BatchOptions {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            target_language: target_language.into(),
            detect: DetectOptions::default(),
            translate: TranslateOptions::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl From<&Config> for BatchOptions {
    fn from(config: &Config) -> Self {
        let mut detect = DetectOptions::default().with_min_confidence(config.detection.min_confidence);
        detect.source_language = config.source_language.clone();

        Self {
            batch_size: config.batch.batch_size.max(1),
            target_language: config.target_language.clone(),
            detect,
            translate: TranslateOptions {
                source_language: config.source_language.clone(),
                context: None,
            },
        }
    }
}

/// A detected region with its translation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedArea {
    #[serde(flatten)]
    pub area: TextArea,
    pub translation: String,
}

/// Result of one successfully processed target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetOutcome {
    pub target_id: String,
    pub target_language: String,
    pub areas: Vec<TranslatedArea>,
}

/// Notifications delivered to the run observer, in order
#[derive(Debug)]
pub enum BatchEvent {
    Started { run_id: Uuid, total: usize },
    TargetCompleted(TargetOutcome),
    TargetFailed { target_id: String, error: OrchestratorError },
    /// Zero-based index of the batch that just settled
    BatchFinished { index: usize, progress: BatchProgress },
    Paused(BatchProgress),
    Resumed(BatchProgress),
    Completed(BatchProgress),
    Cancelled(BatchProgress),
}

#[derive(Debug)]
struct ControlState {
    status: Mutex<BatchStatus>,
    progress: Mutex<BatchProgress>,
    pause: watch::Sender<bool>,
    cancel: CancellationToken,
}

/// Clonable handle for steering a run from another task
#[derive(Debug, Clone)]
pub struct BatchControl {
    state: Arc<ControlState>,
}

impl BatchControl {
    fn new() -> Self {
        let (pause, _) = watch::channel(false);
        Self {
            state: Arc::new(ControlState {
                status: Mutex::new(BatchStatus::Idle),
                progress: Mutex::new(BatchProgress::default()),
                pause,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Ask the run to stop before its next batch
    pub fn pause(&self) {
        self.state.pause.send_replace(true);
    }

    /// Let a paused run continue from where it stopped
    pub fn resume(&self) {
        self.state.pause.send_replace(false);
    }

    /// Stop the run after the batch in progress; wakes a paused run
    pub fn cancel(&self) {
        self.state.cancel.cancel();
    }

    pub fn is_pause_requested(&self) -> bool {
        *self.state.pause.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }

    pub fn status(&self) -> BatchStatus {
        *self.state.status.lock()
    }

    pub fn progress(&self) -> BatchProgress {
        *self.state.progress.lock()
    }

    fn set_status(&self, status: BatchStatus) {
        *self.state.status.lock() = status;
    }

    /// Idle -> Processing, atomically
    fn begin(&self) -> Result<(), BatchError> {
        let mut status = self.state.status.lock();
        if *status != BatchStatus::Idle {
            return Err(BatchError::NotIdle(status.to_string()));
        }
        *status = BatchStatus::Processing;
        Ok(())
    }
}

/// Runs detection and translation over a set of targets
#[derive(Debug)]
pub struct BatchProcessor {
    orchestrator: RequestOrchestrator,
    options: BatchOptions,
    control: BatchControl,
    run_id: Uuid,
}

impl BatchProcessor {
    pub fn new(orchestrator: RequestOrchestrator, options: BatchOptions) -> Self {
        Self {
            orchestrator,
            options,
            control: BatchControl::new(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn control(&self) -> BatchControl {
        self.control.clone()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run every target from `source`, reporting to `observer`
    ///
    /// # Returns
    /// * `Result<BatchProgress, BatchError>` - Final progress, or an error
    ///   when the processor is not idle or enumeration failed
    pub async fn run<S, F>(&self, source: &S, mut observer: F) -> Result<BatchProgress, BatchError>
    where
        S: TargetSource + ?Sized,
        F: FnMut(&BatchEvent),
    {
        self.control.begin()?;

        let targets = match source.targets().await {
            Ok(targets) => targets,
            Err(e) => {
                self.control.set_status(BatchStatus::Idle);
                return Err(e);
            }
        };

        let total = targets.len();
        let started = Instant::now();
        let mut progress = BatchProgress::new(total);
        *self.control.state.progress.lock() = progress;

        let batch_size = self.options.batch_size.max(1);
        info!(
            "Batch run {} started: {} targets in batches of {}",
            self.run_id, total, batch_size
        );
        observer(&BatchEvent::Started {
            run_id: self.run_id,
            total,
        });

        let mut pause = self.control.state.pause.subscribe();
        let cancel = self.control.state.cancel.clone();
        let mut cursor = 0;
        let mut batch_index = 0;
        let mut cancelled = false;

        while cursor < total {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if *pause.borrow_and_update() {
                self.control.set_status(BatchStatus::Paused);
                progress.elapsed = started.elapsed();
                info!("Batch run {} paused at {}/{}", self.run_id, cursor, total);
                observer(&BatchEvent::Paused(progress));

                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = pause.wait_for(|paused| !*paused) => {}
                }

                self.control.set_status(BatchStatus::Processing);
                progress.elapsed = started.elapsed();
                info!("Batch run {} resumed", self.run_id);
                observer(&BatchEvent::Resumed(progress));
            }

            let end = (cursor + batch_size).min(total);
            debug!("Batch {} covers targets {}..{}", batch_index, cursor, end);

            let results = join_all(targets[cursor..end].iter().map(|target| self.process_target(target))).await;

            for (target, result) in targets[cursor..end].iter().zip(results) {
                progress.processed += 1;
                match result {
                    Ok(outcome) => observer(&BatchEvent::TargetCompleted(outcome)),
                    Err(error) => {
                        progress.failed += 1;
                        warn!("Target {} failed: {}", target.id, error);
                        observer(&BatchEvent::TargetFailed {
                            target_id: target.id.clone(),
                            error,
                        });
                    }
                }
            }

            cursor = end;
            progress.elapsed = started.elapsed();
            *self.control.state.progress.lock() = progress;
            observer(&BatchEvent::BatchFinished {
                index: batch_index,
                progress,
            });
            batch_index += 1;
        }

        progress.elapsed = started.elapsed();
        *self.control.state.progress.lock() = progress;

        if cancelled {
            self.control.set_status(BatchStatus::Cancelled);
            info!(
                "Batch run {} cancelled after {}/{} targets",
                self.run_id, progress.processed, total
            );
            observer(&BatchEvent::Cancelled(progress));
        } else {
            self.control.set_status(BatchStatus::Completed);
            info!(
                "Batch run {} completed: {} ok, {} failed in {:.1}s",
                self.run_id,
                progress.succeeded(),
                progress.failed,
                progress.elapsed.as_secs_f64()
            );
            observer(&BatchEvent::Completed(progress));
        }

        Ok(progress)
    }

    /// Detect, then translate whatever text was found
    async fn process_target(&self, target: &ImageTarget) -> Result<TargetOutcome, OrchestratorError> {
        let image = target.load().await.map_err(|e| {
            OrchestratorError::new(
                ErrorKind::Unknown,
                "load_image",
                0,
                format!("failed to read {}: {}", target.id, e),
            )
        })?;

        let areas = self
            .orchestrator
            .detect_text(&image, &self.options.detect)
            .await?;

        let translations = if areas.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = areas.iter().map(|area| area.text.clone()).collect();
            self.orchestrator
                .translate_text(&texts, &self.options.target_language, &self.options.translate)
                .await?
        };

        Ok(TargetOutcome {
            target_id: target.id.clone(),
            target_language: self.options.target_language.clone(),
            areas: areas
                .into_iter()
                .zip(translations)
                .map(|(area, translation)| TranslatedArea { area, translation })
                .collect(),
        })
    }
}
