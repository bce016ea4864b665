//! Display capture using the `xcap` crate.
//!
//! This is the infrastructure layer. It talks to the OS. Everything above it
//! goes through the [`DisplayCapturer`] trait so tests never need a screen.

use super::{CaptureError, DisplayCapturer, DisplayInfo, Rect};
use image::{DynamicImage, RgbaImage};
use xcap::Monitor;

/// Picks the display an overlay window lives on.
///
/// The display containing the window centre wins; failing that, the one with
/// the largest overlap, then the primary, then whatever comes first.
pub fn select_display<'a>(displays: &'a [DisplayInfo], window: &Rect) -> Option<&'a DisplayInfo> {
    let center = window.center();
    displays
        .iter()
        .find(|d| d.bounds.contains_point(center))
        .or_else(|| {
            displays
                .iter()
                .filter(|d| d.bounds.intersection_area(window) > 0)
                .max_by_key(|d| d.bounds.intersection_area(window))
        })
        .or_else(|| displays.iter().find(|d| d.is_primary))
        .or_else(|| displays.first())
}

/// `DisplayCapturer` backed by `xcap::Monitor`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapCapturer;

impl XcapCapturer {
    pub fn new() -> Self {
        Self
    }

    fn monitors() -> Result<Vec<Monitor>, CaptureError> {
        Monitor::all().map_err(|e| CaptureError::DisplayEnumeration(e.to_string()))
    }

    fn describe(monitor: &Monitor) -> Result<DisplayInfo, CaptureError> {
        let enum_err = |e: xcap::XCapError| CaptureError::DisplayEnumeration(e.to_string());
        Ok(DisplayInfo {
            id: monitor.id().map_err(enum_err)?,
            bounds: Rect {
                x: monitor.x().map_err(enum_err)?,
                y: monitor.y().map_err(enum_err)?,
                width: monitor.width().map_err(enum_err)?,
                height: monitor.height().map_err(enum_err)?,
            },
            scale_factor: monitor.scale_factor().map_err(enum_err)? as f64,
            is_primary: monitor.is_primary().unwrap_or(false),
        })
    }
}

impl DisplayCapturer for XcapCapturer {
    fn displays(&self) -> Result<Vec<DisplayInfo>, CaptureError> {
        Self::monitors()?.iter().map(Self::describe).collect()
    }

    fn capture_display(&self, display: &DisplayInfo) -> Result<DynamicImage, CaptureError> {
        let monitor = Self::monitors()?
            .into_iter()
            .find(|m| m.id().map(|id| id == display.id).unwrap_or(false))
            .ok_or(CaptureError::NoDisplay)?;

        let image = monitor
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        Ok(DynamicImage::ImageRgba8(image))
    }

    /// Composites every monitor onto one canvas at its physical offset.
    fn capture_desktop(&self) -> Result<(DisplayInfo, DynamicImage), CaptureError> {
        let monitors = Self::monitors()?;
        let mut shots = Vec::with_capacity(monitors.len());
        for monitor in &monitors {
            let info = Self::describe(monitor)?;
            match monitor.capture_image() {
                Ok(img) => shots.push((info, img)),
                Err(e) => log::warn!("[CAPTURE] Skipping display {} in desktop grab: {}", info.id, e),
            }
        }
        if shots.is_empty() {
            return Err(CaptureError::CaptureFailed(
                "no display could be captured".to_string(),
            ));
        }

        let scale = shots
            .iter()
            .find(|(d, _)| d.is_primary)
            .map(|(d, _)| d.scale_factor)
            .unwrap_or(shots[0].0.scale_factor);
        let min_x = shots.iter().map(|(d, _)| d.bounds.x).min().unwrap_or(0);
        let min_y = shots.iter().map(|(d, _)| d.bounds.y).min().unwrap_or(0);
        let max_x = shots.iter().map(|(d, _)| d.bounds.right()).max().unwrap_or(0);
        let max_y = shots.iter().map(|(d, _)| d.bounds.bottom()).max().unwrap_or(0);

        let offset = |logical: i64| ((logical as f64) * scale).round() as i64;
        let placed: Vec<(i64, i64, &RgbaImage)> = shots
            .iter()
            .map(|(d, img)| {
                (
                    offset(d.bounds.x as i64 - min_x as i64),
                    offset(d.bounds.y as i64 - min_y as i64),
                    img,
                )
            })
            .collect();

        let canvas_w = placed.iter().map(|(x, _, img)| x + img.width() as i64).max().unwrap_or(0);
        let canvas_h = placed.iter().map(|(_, y, img)| y + img.height() as i64).max().unwrap_or(0);
        let mut canvas = RgbaImage::new(canvas_w as u32, canvas_h as u32);
        for (x, y, img) in placed {
            image::imageops::overlay(&mut canvas, img, x, y);
        }

        let desktop = DisplayInfo {
            id: 0,
            bounds: Rect {
                x: min_x,
                y: min_y,
                width: (max_x - min_x as i64) as u32,
                height: (max_y - min_y as i64) as u32,
            },
            scale_factor: scale,
            is_primary: false,
        };
        Ok((desktop, DynamicImage::ImageRgba8(canvas)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(id: u32, bounds: Rect, is_primary: bool) -> DisplayInfo {
        DisplayInfo { id, bounds, scale_factor: 1.0, is_primary }
    }

    fn two_displays() -> Vec<DisplayInfo> {
        vec![
            display(1, Rect::new(0, 0, 1920, 1080), true),
            display(2, Rect::new(1920, 0, 2560, 1440), false),
        ]
    }

    #[test]
    fn picks_display_containing_window_center() {
        let displays = two_displays();
        let window = Rect::new(2000, 100, 400, 300);
        assert_eq!(select_display(&displays, &window).unwrap().id, 2);
    }

    #[test]
    fn straddling_window_goes_to_the_display_holding_its_center() {
        let displays = two_displays();
        // Centre at x=1960, on display 2, even though it starts on display 1.
        let window = Rect::new(1760, 100, 400, 300);
        assert_eq!(select_display(&displays, &window).unwrap().id, 2);
    }

    #[test]
    fn falls_back_to_largest_overlap_then_primary() {
        let displays = two_displays();
        // Centre below every display, but overlaps display 1 more.
        let window = Rect::new(100, 1000, 400, 400);
        assert_eq!(select_display(&displays, &window).unwrap().id, 1);

        let window = Rect::new(10_000, 10_000, 10, 10);
        assert_eq!(select_display(&displays, &window).unwrap().id, 1);
    }

    #[test]
    fn empty_display_list_selects_nothing() {
        assert!(select_display(&[], &Rect::new(0, 0, 10, 10)).is_none());
    }
}
