//! Hide → settle → grab → restore choreography around a screen capture.
//!
//! The overlay must never appear in its own screenshot, so it is hidden and
//! the compositor given time to drop it from the framebuffer before the grab.

use super::region::device_rect;
use super::screenshot::select_display;
use super::{CaptureError, CaptureFrame, DisplayCapturer, Rect, WindowShell};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Wait between hiding the overlay and grabbing the frame.
pub const COMPOSITOR_SETTLE_MS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    Idle,
    Hiding,
    WaitingForCompositor,
    Capturing,
    Restoring,
}

pub struct CaptureController {
    shell: Arc<dyn WindowShell>,
    capturer: Arc<dyn DisplayCapturer>,
    settle: Duration,
    phase: Mutex<CapturePhase>,
    in_flight: tokio::sync::Mutex<()>,
}

impl CaptureController {
    pub fn new(shell: Arc<dyn WindowShell>, capturer: Arc<dyn DisplayCapturer>) -> Self {
        Self {
            shell,
            capturer,
            settle: Duration::from_millis(COMPOSITOR_SETTLE_MS),
            phase: Mutex::new(CapturePhase::Idle),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase.lock().map(|p| *p).unwrap_or(CapturePhase::Idle)
    }

    fn enter(&self, phase: CapturePhase) {
        if let Ok(mut guard) = self.phase.lock() {
            *guard = phase;
        }
        log::debug!("[CAPTURE] -> {:?}", phase);
    }

    /// Runs one capture. A second call while one is in flight fails with
    /// [`CaptureError::Busy`] instead of interleaving.
    ///
    /// A window that was hidden beforehand stays hidden on success. On failure
    /// the window is shown regardless, so the app can't get stuck invisible.
    pub async fn capture(&self) -> Result<CaptureFrame, CaptureError> {
        let _flight = self.in_flight.try_lock().map_err(|_| CaptureError::Busy)?;
        let start = Instant::now();

        let was_visible = self.shell.is_visible();
        if was_visible {
            self.enter(CapturePhase::Hiding);
            self.shell.set_visible(false);
        }

        self.enter(CapturePhase::WaitingForCompositor);
        tokio::time::sleep(self.settle).await;

        // The window may have been destroyed while we were waiting.
        let result = match self.shell.window_bounds() {
            Some(bounds) => {
                self.enter(CapturePhase::Capturing);
                self.grab(bounds).await
            }
            None => Err(CaptureError::WindowGone),
        };

        self.enter(CapturePhase::Restoring);
        match &result {
            Ok(frame) => {
                if was_visible {
                    self.shell.set_visible(true);
                }
                log::info!(
                    "[CAPTURE] Captured display {} region {:?} in {}ms",
                    frame.display.id,
                    frame.region,
                    start.elapsed().as_millis()
                );
            }
            Err(e) => {
                log::error!("[CAPTURE] Capture failed: {}", e);
                self.shell.set_visible(true);
            }
        }
        self.enter(CapturePhase::Idle);

        result
    }

    async fn grab(&self, window: Rect) -> Result<CaptureFrame, CaptureError> {
        let capturer = Arc::clone(&self.capturer);
        tokio::task::spawn_blocking(move || grab_blocking(capturer.as_ref(), window))
            .await
            .map_err(|e| CaptureError::CaptureFailed(format!("capture task failed: {}", e)))?
    }
}

fn grab_blocking(capturer: &dyn DisplayCapturer, window: Rect) -> Result<CaptureFrame, CaptureError> {
    let per_display = capturer.displays().and_then(|displays| {
        let display = select_display(&displays, &window)
            .cloned()
            .ok_or(CaptureError::NoDisplay)?;
        let image = capturer.capture_display(&display)?;
        Ok((display, image))
    });

    let (display, image) = match per_display {
        Ok(shot) => shot,
        Err(e) => {
            log::warn!("[CAPTURE] Display capture failed ({}), trying whole desktop", e);
            capturer.capture_desktop()?
        }
    };

    let region = device_rect(&window, &display.bounds, display.scale_factor);
    Ok(CaptureFrame {
        image: Arc::new(image),
        region,
        display,
    })
}
