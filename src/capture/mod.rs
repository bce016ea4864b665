//! Screen capture domain: public API.
//!
//! This module owns everything between a capture trigger and a cropped PNG:
//! the window/display seams, the hide-grab-restore choreography, and the
//! pure cropping math. External code should only use what is exported here.

mod controller;
mod region;
mod screenshot;
mod shell;

pub use controller::{CaptureController, CapturePhase, COMPOSITOR_SETTLE_MS};
pub use region::{crop_to_png_bytes, device_rect, CropError};
pub use screenshot::{select_display, XcapCapturer};
pub use shell::{HeadlessShell, WindowShell};

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Axis-aligned rectangle. Logical units for window/display bounds,
/// physical pixels once passed through [`device_rect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn center(&self) -> (i64, i64) {
        (
            self.x as i64 + self.width as i64 / 2,
            self.y as i64 + self.height as i64 / 2,
        )
    }

    pub fn contains_point(&self, (px, py): (i64, i64)) -> bool {
        px >= self.x as i64 && px < self.right() && py >= self.y as i64 && py < self.bottom()
    }

    /// Area of the overlap with `other`, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> u64 {
        let left = (self.x as i64).max(other.x as i64);
        let top = (self.y as i64).max(other.y as i64);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return 0;
        }
        ((right - left) * (bottom - top)) as u64
    }
}

/// A physical display as reported by the OS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    /// Logical bounds in the virtual-desktop coordinate space.
    pub bounds: Rect,
    pub scale_factor: f64,
    pub is_primary: bool,
}

/// A full-display screenshot plus the physical-pixel region of interest.
///
/// The image is shared so batch snapshots can be cloned without copying pixels.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub image: Arc<DynamicImage>,
    pub region: Rect,
    pub display: DisplayInfo,
}

/// OS-level screen grabbing. Implementations are blocking and are driven from
/// `spawn_blocking` by the controller.
pub trait DisplayCapturer: Send + Sync {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError>;

    fn capture_display(&self, display: &DisplayInfo) -> Result<DynamicImage, CaptureError>;

    /// Whole virtual desktop, used once as a fallback when a single display fails.
    fn capture_desktop(&self) -> Result<(DisplayInfo, DynamicImage), CaptureError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error("Failed to enumerate displays: {0}")]
    DisplayEnumeration(String),

    #[error("No display found for the overlay window")]
    NoDisplay,

    #[error("Screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("Overlay window is gone")]
    WindowGone,

    #[error("A capture is already in progress")]
    Busy,
}
