//! Event coordinator: turns shell events into captures, pipeline runs and
//! batch work, and reports everything back to the UI as [`UiEvent`]s.
//!
//! Events are handled one at a time, in arrival order. That sequencing is
//! what keeps a capture from starting while a batch is being sent.

use crate::capture::{CaptureController, CaptureError, DisplayCapturer, WindowShell};
use crate::pipeline::{
    AnalysisResult, BatchError, BatchProcessor, BatchQueue, BatchSummary, PipelineError,
    SingleCapturePipeline, Stage,
};
use crate::settings::{load_credentials, CredentialKind, CredentialMissingError, Credentials, SettingsStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Triggers coming from the window shell (global shortcuts, tray, stdin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShellEvent {
    Capture,
    BatchCapture,
    BatchSend,
    BatchClear,
    ToggleVisibility,
}

/// Everything the UI is told about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiEvent {
    Status {
        stage: Stage,
    },
    Result {
        result: AnalysisResult,
    },
    CaptureFailed {
        message: String,
        retryable: bool,
    },
    CredentialsMissing {
        credential: CredentialKind,
        message: String,
    },
    BatchQueued {
        count: usize,
    },
    BatchEmpty,
    BatchStarted {
        total: usize,
    },
    /// Send refused because another batch is still being processed.
    BatchRejected {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    BatchItemComplete {
        index: usize,
        total: usize,
        result: AnalysisResult,
    },
    BatchComplete {
        summary: BatchSummary,
        results: Vec<AnalysisResult>,
    },
    BatchCleared,
    VisibilityChanged {
        visible: bool,
    },
}

impl From<CaptureError> for UiEvent {
    fn from(e: CaptureError) -> Self {
        let message = e.to_string();
        UiEvent::CaptureFailed {
            message,
            retryable: PipelineError::from(e).is_retryable(),
        }
    }
}

impl From<CredentialMissingError> for UiEvent {
    fn from(e: CredentialMissingError) -> Self {
        UiEvent::CredentialsMissing {
            credential: e.0,
            message: e.to_string(),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

impl EventSink for mpsc::UnboundedSender<UiEvent> {
    fn emit(&self, event: UiEvent) {
        if self.send(event).is_err() {
            log::debug!("[APP] UI receiver dropped, discarding event");
        }
    }
}

pub struct Coordinator {
    shell: Arc<dyn WindowShell>,
    controller: CaptureController,
    pipeline: Arc<SingleCapturePipeline>,
    batch: BatchProcessor,
    queue: BatchQueue,
    store: Arc<dyn SettingsStore>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        shell: Arc<dyn WindowShell>,
        capturer: Arc<dyn DisplayCapturer>,
        pipeline: Arc<SingleCapturePipeline>,
        store: Arc<dyn SettingsStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            controller: CaptureController::new(Arc::clone(&shell), capturer),
            shell,
            batch: BatchProcessor::new(Arc::clone(&pipeline)),
            pipeline,
            queue: BatchQueue::new(),
            store,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.controller = self.controller.with_settle_delay(settle);
        self
    }

    /// Token that stops [`run`](Self::run) and any batch in progress.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn queue(&self) -> &BatchQueue {
        &self.queue
    }

    /// Consumes shell events until the channel closes or the token is cancelled.
    pub async fn run(&self, mut events: mpsc::Receiver<ShellEvent>) {
        log::info!("[APP] Coordinator started");
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event).await;
        }
        log::info!("[APP] Coordinator stopped");
    }

    pub async fn handle(&self, event: ShellEvent) {
        log::debug!("[APP] Handling {:?}", event);
        match event {
            ShellEvent::Capture => self.capture_and_analyze().await,
            ShellEvent::BatchCapture => self.capture_into_batch().await,
            ShellEvent::BatchSend => self.send_batch().await,
            ShellEvent::BatchClear => {
                self.queue.clear();
                self.sink.emit(UiEvent::BatchCleared);
            }
            ShellEvent::ToggleVisibility => {
                let visible = !self.shell.is_visible();
                self.shell.set_visible(visible);
                self.sink.emit(UiEvent::VisibilityChanged { visible });
            }
        }
    }

    /// Credentials the pipeline needs, or `None` after telling the UI which is missing.
    fn credentials(&self) -> Option<Credentials> {
        let credentials = load_credentials(self.store.as_ref()).unwrap_or_else(|e| {
            log::error!("[SETTINGS] Could not read credentials: {}", e);
            Credentials::default()
        });
        match credentials.ensure_present(self.pipeline.needs_upload()) {
            Ok(()) => Some(credentials),
            Err(e) => {
                log::warn!("[APP] {}", e);
                self.sink.emit(e.into());
                None
            }
        }
    }

    async fn capture_and_analyze(&self) {
        let Some(credentials) = self.credentials() else {
            return;
        };
        let frame = match self.controller.capture().await {
            Ok(frame) => frame,
            Err(e) => {
                self.sink.emit(e.into());
                return;
            }
        };

        let result = self
            .pipeline
            .run_with_status(&frame, &frame.region, &credentials, |stage| {
                self.sink.emit(UiEvent::Status { stage })
            })
            .await;
        self.sink.emit(UiEvent::Result { result });
    }

    async fn capture_into_batch(&self) {
        match self.controller.capture().await {
            Ok(frame) => {
                let count = self.queue.enqueue(frame);
                self.sink.emit(UiEvent::BatchQueued { count });
            }
            Err(e) => self.sink.emit(e.into()),
        }
    }

    async fn send_batch(&self) {
        let items = self.queue.drain();
        if items.is_empty() {
            self.sink.emit(UiEvent::BatchEmpty);
            return;
        }
        let Some(credentials) = self.credentials() else {
            return;
        };
        if self.batch.is_running() {
            self.reject_batch();
            return;
        }

        let total = items.len();
        self.sink.emit(UiEvent::BatchStarted { total });
        let outcome = self
            .batch
            .process_all(&items, &credentials, &self.cancel, |index, result| {
                self.sink.emit(UiEvent::BatchItemComplete {
                    index,
                    total,
                    result: result.clone(),
                })
            })
            .await;

        match outcome {
            Ok(results) => self.sink.emit(UiEvent::BatchComplete {
                summary: BatchSummary::from_results(&results),
                results,
            }),
            Err(BatchError::Empty) => self.sink.emit(UiEvent::BatchEmpty),
            Err(BatchError::Credentials(e)) => self.sink.emit(e.into()),
            Err(BatchError::AlreadyRunning) => self.reject_batch(),
        }
    }

    fn reject_batch(&self) {
        log::warn!("[BATCH] Send ignored, batch already running");
        self.sink.emit(UiEvent::BatchRejected {
            message: BatchError::AlreadyRunning.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureError, DisplayInfo, HeadlessShell, Rect};
    use crate::pipeline::ImageDelivery;
    use crate::providers::{AnalysisError, AnalysisProvider, ImageRef};
    use crate::settings::{MemoryStore, KEY_ANALYSIS_API_KEY};
    use async_trait::async_trait;
    use image::{DynamicImage, RgbaImage};

    struct BlankScreen;

    impl DisplayCapturer for BlankScreen {
        fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
            Ok(vec![DisplayInfo {
                id: 1,
                bounds: Rect::new(0, 0, 200, 200),
                scale_factor: 1.0,
                is_primary: true,
            }])
        }

        fn capture_display(&self, _display: &DisplayInfo) -> Result<DynamicImage, CaptureError> {
            Ok(DynamicImage::ImageRgba8(RgbaImage::new(200, 200)))
        }

        fn capture_desktop(&self) -> Result<(DisplayInfo, DynamicImage), CaptureError> {
            Err(CaptureError::CaptureFailed("unused".into()))
        }
    }

    struct EchoAnalyzer;

    #[async_trait]
    impl AnalysisProvider for EchoAnalyzer {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn analyze(
            &self,
            _prompt: &str,
            image: &ImageRef,
            _credentials: &Credentials,
        ) -> Result<String, AnalysisError> {
            match image {
                ImageRef::Inline(bytes) => Ok(format!("{} bytes", bytes.len())),
                ImageRef::Url(url) => Ok(url.clone()),
            }
        }
    }

    struct SlowAnalyzer(Duration);

    #[async_trait]
    impl AnalysisProvider for SlowAnalyzer {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn analyze(
            &self,
            _prompt: &str,
            _image: &ImageRef,
            _credentials: &Credentials,
        ) -> Result<String, AnalysisError> {
            tokio::time::sleep(self.0).await;
            Ok("done".into())
        }
    }

    /// Overlay window that has already been destroyed.
    struct ClosedShell;

    impl WindowShell for ClosedShell {
        fn window_bounds(&self) -> Option<Rect> {
            None
        }

        fn is_visible(&self) -> bool {
            false
        }

        fn set_visible(&self, _visible: bool) {}
    }

    fn build(
        store: MemoryStore,
        shell: Arc<dyn WindowShell>,
        analyzer: Arc<dyn AnalysisProvider>,
    ) -> (Coordinator, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = SingleCapturePipeline::new(ImageDelivery::Inline, analyzer);
        let coordinator = Coordinator::new(
            shell,
            Arc::new(BlankScreen),
            Arc::new(pipeline),
            Arc::new(store),
            Arc::new(tx),
        )
        .with_settle_delay(Duration::ZERO);
        (coordinator, rx)
    }

    fn coordinator(store: MemoryStore) -> (Coordinator, mpsc::UnboundedReceiver<UiEvent>, Arc<HeadlessShell>) {
        let shell = Arc::new(HeadlessShell::new(Rect::new(10, 10, 50, 50)));
        let (coordinator, rx) = build(store, shell.clone(), Arc::new(EchoAnalyzer));
        (coordinator, rx, shell)
    }

    fn keyed() -> MemoryStore {
        MemoryStore::new().with(KEY_ANALYSIS_API_KEY, "sk-test")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn capture_reports_stages_then_result() {
        let (coordinator, mut rx, shell) = coordinator(keyed());
        coordinator.handle(ShellEvent::Capture).await;

        let events = drain(&mut rx);
        let stages: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::Status { stage } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec![Stage::Cropping, Stage::Analyzing]);
        assert!(matches!(events.last(), Some(UiEvent::Result { result }) if result.is_success()));
        assert!(shell.is_visible());
    }

    #[tokio::test]
    async fn capture_without_key_reports_missing_credential() {
        let (coordinator, mut rx, _) = coordinator(MemoryStore::new());
        coordinator.handle(ShellEvent::Capture).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            UiEvent::CredentialsMissing { credential: CredentialKind::AnalysisApiKey, .. }
        ));
    }

    #[tokio::test]
    async fn batch_send_keeps_the_queue() {
        let (coordinator, mut rx, _) = coordinator(keyed());
        coordinator.handle(ShellEvent::BatchCapture).await;
        coordinator.handle(ShellEvent::BatchCapture).await;
        coordinator.handle(ShellEvent::BatchSend).await;

        let events = drain(&mut rx);
        assert!(matches!(events[1], UiEvent::BatchQueued { count: 2 }));
        let items: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                UiEvent::BatchItemComplete { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(items, vec![0, 1]);
        assert!(matches!(
            events.last(),
            Some(UiEvent::BatchComplete { summary: BatchSummary { succeeded: 2, failed: 0, .. }, .. })
        ));
        assert_eq!(coordinator.queue().count(), 2);

        coordinator.handle(ShellEvent::BatchClear).await;
        coordinator.handle(ShellEvent::BatchSend).await;
        let events = drain(&mut rx);
        assert!(matches!(events[..], [UiEvent::BatchCleared, UiEvent::BatchEmpty]));
    }

    #[tokio::test]
    async fn destroyed_window_is_reported_as_not_retryable() {
        let (coordinator, mut rx) = build(keyed(), Arc::new(ClosedShell), Arc::new(EchoAnalyzer));

        coordinator.handle(ShellEvent::Capture).await;
        coordinator.handle(ShellEvent::BatchCapture).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        for event in &events {
            assert!(matches!(
                event,
                UiEvent::CaptureFailed { retryable: false, message } if message == "Overlay window is gone"
            ));
        }
        assert_eq!(coordinator.queue().count(), 0);
    }

    #[test]
    fn transient_capture_errors_stay_retryable() {
        let event = UiEvent::from(CaptureError::CaptureFailed("grab timed out".into()));
        assert!(matches!(event, UiEvent::CaptureFailed { retryable: true, .. }));
    }

    #[tokio::test]
    async fn overlapping_batch_send_is_rejected_on_the_sink() {
        let shell = Arc::new(HeadlessShell::new(Rect::new(10, 10, 50, 50)));
        let (coordinator, mut rx) = build(keyed(), shell, Arc::new(SlowAnalyzer(Duration::from_millis(100))));
        coordinator.handle(ShellEvent::BatchCapture).await;

        tokio::join!(
            coordinator.handle(ShellEvent::BatchSend),
            coordinator.handle(ShellEvent::BatchSend)
        );

        let events = drain(&mut rx);
        let rejected = events
            .iter()
            .filter(|e| matches!(e, UiEvent::BatchRejected { .. }))
            .count();
        let completed = events
            .iter()
            .filter(|e| matches!(e, UiEvent::BatchComplete { .. }))
            .count();
        assert_eq!(rejected, 1);
        assert_eq!(completed, 1);
        assert!(matches!(
            events.iter().find(|e| matches!(e, UiEvent::BatchRejected { .. })),
            Some(UiEvent::BatchRejected { message }) if message == "A batch is already being processed"
        ));
    }

    #[tokio::test]
    async fn toggle_flips_visibility() {
        let (coordinator, mut rx, shell) = coordinator(keyed());
        coordinator.handle(ShellEvent::ToggleVisibility).await;
        assert!(!shell.is_visible());
        assert!(matches!(
            drain(&mut rx)[..],
            [UiEvent::VisibilityChanged { visible: false }]
        ));
    }

    #[tokio::test]
    async fn run_stops_when_the_channel_closes() {
        let (coordinator, mut rx, _) = coordinator(keyed());
        let (tx, events) = mpsc::channel(4);
        tx.send(ShellEvent::ToggleVisibility).await.unwrap();
        tx.send(ShellEvent::ToggleVisibility).await.unwrap();
        drop(tx);

        coordinator.run(events).await;
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn ui_events_serialize_with_a_type_tag() {
        let json = serde_json::to_value(UiEvent::BatchQueued { count: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "batchQueued", "count": 3}));
    }
}
