//! Batch mode: queue several captures, then analyze them all in one pass.
//!
//! Items are held uncropped; the crop happens at send time, inside the same
//! per-item pipeline a single capture uses.

use super::{AnalysisResult, PipelineError, SingleCapturePipeline, SourceRef};
use crate::capture::CaptureFrame;
use crate::settings::{CredentialMissingError, Credentials};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// One queued capture. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct CapturedItem {
    pub frame: CaptureFrame,
    pub captured_at: DateTime<Utc>,
    pub sequence_index: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<CapturedItem>,
    next_index: u64,
}

/// Ordered in-memory capture queue. Survives a failed send; only
/// [`clear`](Self::clear) empties it.
#[derive(Debug, Default)]
pub struct BatchQueue {
    state: Mutex<QueueState>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Queue state stays consistent even if a holder panicked mid-push.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a capture and returns the new queue length.
    pub fn enqueue(&self, frame: CaptureFrame) -> usize {
        let mut state = self.lock();
        let sequence_index = state.next_index;
        state.next_index += 1;
        state.items.push(CapturedItem {
            frame,
            captured_at: Utc::now(),
            sequence_index,
        });
        log::info!("[BATCH] Queued capture #{} ({} pending)", sequence_index, state.items.len());
        state.items.len()
    }

    pub fn count(&self) -> usize {
        self.lock().items.len()
    }

    /// Snapshot of the queue in enqueue order. Does not remove anything, so
    /// calling it twice with no enqueue in between yields the same items.
    pub fn drain(&self) -> Vec<CapturedItem> {
        self.lock().items.clone()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        let dropped = state.items.len();
        state.items.clear();
        log::info!("[BATCH] Cleared {} queued captures", dropped);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("No captures queued")]
    Empty,

    #[error("A batch is already being processed")]
    AlreadyRunning,

    #[error(transparent)]
    Credentials(#[from] CredentialMissingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// Runs queued items one at a time through the single-capture pipeline.
pub struct BatchProcessor {
    pipeline: Arc<SingleCapturePipeline>,
    running: tokio::sync::Mutex<()>,
}

impl BatchProcessor {
    pub fn new(pipeline: Arc<SingleCapturePipeline>) -> Self {
        Self {
            pipeline,
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Processes `items` in order, calling `on_item_complete(index, result)`
    /// as each finishes. Returns exactly one result per item, positionally
    /// aligned with the input.
    ///
    /// A failing item becomes an error result and processing moves on.
    /// Cancellation is checked between items; anything not yet started comes
    /// back as a cancelled error result so the output length still matches.
    pub async fn process_all<F>(
        &self,
        items: &[CapturedItem],
        credentials: &Credentials,
        cancel: &CancellationToken,
        mut on_item_complete: F,
    ) -> Result<Vec<AnalysisResult>, BatchError>
    where
        F: FnMut(usize, &AnalysisResult) + Send,
    {
        if items.is_empty() {
            return Err(BatchError::Empty);
        }
        let _guard = self.running.try_lock().map_err(|_| BatchError::AlreadyRunning)?;
        credentials.ensure_present(self.pipeline.needs_upload())?;

        log::info!("[BATCH] Processing {} items", items.len());
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let outcome = if cancel.is_cancelled() {
                Err(PipelineError::Cancelled)
            } else {
                self.pipeline
                    .execute(&item.frame.image, &item.frame.region, credentials, |_| {})
                    .await
            };

            match &outcome {
                Ok(_) => log::info!("[BATCH] Item {}/{} done", index + 1, items.len()),
                Err(e) => log::warn!("[BATCH] Item {}/{} failed: {}", index + 1, items.len(), e),
            }

            let result = AnalysisResult::new(
                SourceRef::BatchItem {
                    sequence_index: item.sequence_index,
                    captured_at: item.captured_at,
                },
                outcome,
            );
            on_item_complete(index, &result);
            results.push(result);
        }

        let summary = BatchSummary::from_results(&results);
        log::info!(
            "[BATCH] Finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        Ok(results)
    }
}
