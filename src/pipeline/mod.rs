//! Capture-to-analysis pipeline: crop → upload → analyze, for one snip or a
//! queued batch of them.

mod batch;
mod single;

pub use batch::{BatchError, BatchProcessor, BatchQueue, BatchSummary, CapturedItem};
pub use single::{ImageDelivery, SingleCapturePipeline};

use crate::capture::{CaptureError, CropError};
use crate::providers::{AnalysisError, UploadError};
use crate::settings::CredentialMissingError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Advisory progress marker emitted before each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Cropping,
    Uploading,
    Analyzing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Cropping => "cropping",
            Stage::Uploading => "uploading",
            Stage::Analyzing => "analyzing",
        })
    }
}

/// What a result was produced for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SourceRef {
    Manual,
    #[serde(rename_all = "camelCase")]
    BatchItem {
        sequence_index: u64,
        captured_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Credentials,
    Capture,
    Crop,
    Upload,
    Analysis,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    Success {
        text: String,
    },
    Failure {
        kind: FailureKind,
        message: String,
        /// Transient; the user can re-trigger the capture to try again.
        retryable: bool,
    },
}

/// One pipeline run's result. Owned by whoever triggered the run; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub source: SourceRef,
    #[serde(flatten)]
    pub outcome: Outcome,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn new(source: SourceRef, outcome: Result<String, PipelineError>) -> Self {
        let outcome = match outcome {
            Ok(text) => Outcome::Success { text },
            Err(e) => Outcome::Failure {
                kind: e.kind(),
                message: e.to_string(),
                retryable: e.is_retryable(),
            },
        };
        Self {
            source,
            outcome,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { text } => Some(text),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { message, .. } => Some(message),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Credentials(#[from] CredentialMissingError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Crop failed: {0}")]
    Crop(#[from] CropError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Batch cancelled before this item ran")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Credentials(_) => FailureKind::Credentials,
            PipelineError::Capture(_) => FailureKind::Capture,
            PipelineError::Crop(_) => FailureKind::Crop,
            PipelineError::Upload(_) => FailureKind::Upload,
            PipelineError::Analysis(_) => FailureKind::Analysis,
            PipelineError::Cancelled => FailureKind::Cancelled,
        }
    }

    /// Transport and service failures; credential, crop and malformed-response
    /// failures won't go away by trying again.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Credentials(_) | PipelineError::Crop(_) => false,
            PipelineError::Capture(e) => !matches!(e, CaptureError::WindowGone),
            PipelineError::Upload(e) => {
                matches!(e, UploadError::Network(_) | UploadError::QuotaOrService(_))
            }
            PipelineError::Analysis(e) => matches!(
                e,
                AnalysisError::Network(_) | AnalysisError::UpstreamRejection { .. }
            ),
            PipelineError::Cancelled => true,
        }
    }
}
