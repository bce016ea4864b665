//! Window-shell seam.
//!
//! The real overlay window lives outside this crate; the capture controller
//! only needs its bounds and visibility.

use super::Rect;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait WindowShell: Send + Sync {
    /// Logical bounds of the overlay, or `None` once the window is destroyed.
    fn window_bounds(&self) -> Option<Rect>;

    fn is_visible(&self) -> bool;

    fn set_visible(&self, visible: bool);
}

/// Shell with no real window: a fixed region and a visibility flag.
///
/// Used by the headless binary, where the "overlay" is just a configured rectangle.
#[derive(Debug)]
pub struct HeadlessShell {
    region: Rect,
    visible: AtomicBool,
}

impl HeadlessShell {
    pub fn new(region: Rect) -> Self {
        Self {
            region,
            visible: AtomicBool::new(true),
        }
    }
}

impl WindowShell for HeadlessShell {
    fn window_bounds(&self) -> Option<Rect> {
        Some(self.region)
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }
}
