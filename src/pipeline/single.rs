//! One capture: crop → (upload) → analyze.
//!
//! Every stage failure short-circuits the rest. Nothing is retried here; a
//! retry is the user triggering the whole pipeline again.

use super::{AnalysisResult, PipelineError, SourceRef, Stage};
use crate::capture::{crop_to_png_bytes, CaptureFrame, CropError, Rect};
use crate::prompts::PromptKind;
use crate::providers::{
    AnalysisError, AnalysisProvider, ImageRef, UploadError, UploadProvider, DEFAULT_TIMEOUT_SECS,
};
use crate::settings::Credentials;
use image::DynamicImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How the cropped PNG reaches the analysis provider.
#[derive(Clone)]
pub enum ImageDelivery {
    /// Upload first, then hand the provider a public URL.
    Upload(Arc<dyn UploadProvider>),
    /// Send the bytes inline; no upload credentials needed.
    Inline,
}

pub struct SingleCapturePipeline {
    delivery: ImageDelivery,
    analyzer: Arc<dyn AnalysisProvider>,
    prompt: String,
    call_timeout: Duration,
}

impl SingleCapturePipeline {
    pub fn new(delivery: ImageDelivery, analyzer: Arc<dyn AnalysisProvider>) -> Self {
        Self {
            delivery,
            analyzer,
            prompt: PromptKind::default().template().to_string(),
            call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn needs_upload(&self) -> bool {
        matches!(self.delivery, ImageDelivery::Upload(_))
    }

    pub async fn run(&self, frame: &CaptureFrame, rect: &Rect, credentials: &Credentials) -> AnalysisResult {
        self.run_with_status(frame, rect, credentials, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_status` before each stage.
    pub async fn run_with_status<F>(
        &self,
        frame: &CaptureFrame,
        rect: &Rect,
        credentials: &Credentials,
        on_status: F,
    ) -> AnalysisResult
    where
        F: FnMut(Stage) + Send,
    {
        let outcome = self.execute(&frame.image, rect, credentials, on_status).await;
        if let Err(e) = &outcome {
            log::warn!("[PIPELINE] Capture analysis failed: {}", e);
        }
        AnalysisResult::new(SourceRef::Manual, outcome)
    }

    pub(crate) async fn execute<F>(
        &self,
        image: &Arc<DynamicImage>,
        rect: &Rect,
        credentials: &Credentials,
        mut on_status: F,
    ) -> Result<String, PipelineError>
    where
        F: FnMut(Stage) + Send,
    {
        credentials.ensure_present(self.needs_upload())?;
        let start = Instant::now();

        on_status(Stage::Cropping);
        let png = crop_off_runtime(Arc::clone(image), *rect).await?;
        log::info!("[PIPELINE] Cropped {} bytes", png.len());

        let image_ref = match &self.delivery {
            ImageDelivery::Upload(uploader) => {
                on_status(Stage::Uploading);
                let url = tokio::time::timeout(self.call_timeout, uploader.upload(&png, credentials))
                    .await
                    .unwrap_or_else(|_| {
                        Err(UploadError::Network(format!(
                            "{} timed out after {}s",
                            uploader.name(),
                            self.call_timeout.as_secs()
                        )))
                    })?;
                log::info!("[PIPELINE] Uploaded via {} at {}ms", uploader.name(), start.elapsed().as_millis());
                ImageRef::Url(url)
            }
            ImageDelivery::Inline => ImageRef::Inline(png),
        };

        on_status(Stage::Analyzing);
        let text = tokio::time::timeout(
            self.call_timeout,
            self.analyzer.analyze(&self.prompt, &image_ref, credentials),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AnalysisError::Network(format!(
                "{} timed out after {}s",
                self.analyzer.name(),
                self.call_timeout.as_secs()
            )))
        })?;

        log::info!(
            "[PIPELINE] Analysis via {} complete in {}ms ({} chars)",
            self.analyzer.name(),
            start.elapsed().as_millis(),
            text.len()
        );
        Ok(text)
    }
}

/// Crop and PNG-encode on the blocking pool; a full-resolution encode would
/// otherwise stall a runtime worker.
pub(crate) async fn crop_off_runtime(image: Arc<DynamicImage>, rect: Rect) -> Result<Vec<u8>, CropError> {
    tokio::task::spawn_blocking(move || crop_to_png_bytes(&image, &rect))
        .await
        .map_err(|e| CropError::EncodingFailed(format!("crop task failed: {}", e)))?
}
