//! Pure region cropping logic: functional core.
//!
//! This module has zero infrastructure dependencies.
//! It takes pixel data in, returns pixel data out.

use super::Rect;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Converts logical window bounds into a physical-pixel rectangle relative to
/// the captured display.
///
/// Origin is `round((window - display) * scale)`, size is
/// `round(window_size * scale)`. Screenshots are always physical pixels, so
/// skipping this step crops the wrong region on any scaled display.
pub fn device_rect(window: &Rect, display: &Rect, scale_factor: f64) -> Rect {
    let scale = |v: f64| (v * scale_factor).round();
    Rect {
        x: scale((window.x as i64 - display.x as i64) as f64) as i32,
        y: scale((window.y as i64 - display.y as i64) as f64) as i32,
        width: scale(window.width as f64) as u32,
        height: scale(window.height as f64) as u32,
    }
}

/// Crops a `DynamicImage` to `rect` and returns PNG bytes.
///
/// Rectangles that hang off the frame are clamped to the visible overlap, since
/// the overlay may sit partially off-screen. Only a rectangle with no overlap
/// at all is an error. Output is deterministic for identical inputs.
pub fn crop_to_png_bytes(image: &DynamicImage, rect: &Rect) -> Result<Vec<u8>, CropError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(CropError::ZeroDimension);
    }

    let (img_width, img_height) = (image.width(), image.height());

    let left = (rect.x as i64).max(0);
    let top = (rect.y as i64).max(0);
    let right = rect.right().min(img_width as i64);
    let bottom = rect.bottom().min(img_height as i64);

    if right <= left || bottom <= top {
        return Err(CropError::OutsideFrame {
            requested: *rect,
            image_size: (img_width, img_height),
        });
    }

    let (x, y) = (left as u32, top as u32);
    let (width, height) = ((right - left) as u32, (bottom - top) as u32);
    let clamped = left != rect.x as i64
        || top != rect.y as i64
        || right != rect.right()
        || bottom != rect.bottom();
    if clamped {
        log::debug!(
            "[CAPTURE] Clamped crop {:?} to {}x{} at {},{}",
            rect, width, height, x, y
        );
    }

    let cropped = image.crop_imm(x, y, width, height);

    let mut png_bytes: Vec<u8> = Vec::new();
    cropped
        .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| CropError::EncodingFailed(e.to_string()))?;

    Ok(png_bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("Crop rectangle has zero width or height")]
    ZeroDimension,

    #[error(
        "Crop rectangle ({},{},{},{}) does not overlap the {}x{} frame",
        requested.x, requested.y, requested.width, requested.height,
        image_size.0, image_size.1
    )]
    OutsideFrame {
        requested: Rect,
        image_size: (u32, u32),
    },

    #[error("PNG encoding failed: {0}")]
    EncodingFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png_size(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn crop_valid_region() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let bytes = crop_to_png_bytes(&img, &Rect::new(10, 10, 50, 50)).unwrap();
        // PNG magic bytes
        assert_eq!(&bytes[..4], &[0x89, 0x50, 0x4E, 0x47]);
        assert_eq!(png_size(&bytes), (50, 50));
    }

    #[test]
    fn crop_zero_dimension_fails() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let result = crop_to_png_bytes(&img, &Rect::new(0, 0, 0, 50));
        assert!(matches!(result, Err(CropError::ZeroDimension)));
    }

    #[test]
    fn crop_partially_out_of_bounds_is_clamped() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let bytes = crop_to_png_bytes(&img, &Rect::new(80, 80, 30, 30)).unwrap();
        assert_eq!(png_size(&bytes), (20, 20));

        let bytes = crop_to_png_bytes(&img, &Rect::new(-10, -5, 30, 30)).unwrap();
        assert_eq!(png_size(&bytes), (20, 25));
    }

    #[test]
    fn crop_fully_outside_fails() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(100, 100));
        let result = crop_to_png_bytes(&img, &Rect::new(150, 10, 30, 30));
        assert!(matches!(result, Err(CropError::OutsideFrame { .. })));
    }

    #[test]
    fn crop_is_deterministic_and_picks_the_right_pixels() {
        let mut raw = RgbaImage::new(40, 40);
        raw.put_pixel(20, 20, Rgba([255, 0, 0, 255]));
        let img = DynamicImage::ImageRgba8(raw);
        let rect = Rect::new(20, 20, 5, 5);

        let a = crop_to_png_bytes(&img, &rect).unwrap();
        let b = crop_to_png_bytes(&img, &rect).unwrap();
        assert_eq!(a, b);

        let decoded = image::load_from_memory(&a).unwrap().to_rgba8();
        assert_eq!(*decoded.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn device_rect_scales_size_exactly() {
        let window = Rect::new(300, 200, 401, 301);
        let display = Rect::new(0, 0, 1920, 1080);
        for scale in [1.0, 1.25, 1.5, 2.0] {
            let r = device_rect(&window, &display, scale);
            assert_eq!(r.width, (401.0 * scale).round() as u32, "scale {}", scale);
            assert_eq!(r.height, (301.0 * scale).round() as u32, "scale {}", scale);
            assert_eq!(r.x, (300.0 * scale).round() as i32);
            assert_eq!(r.y, (200.0 * scale).round() as i32);
        }
    }

    #[test]
    fn device_rect_is_relative_to_a_secondary_display() {
        // Secondary display to the left of the primary, at 1.5x.
        let window = Rect::new(-1500, 100, 400, 300);
        let display = Rect::new(-1920, 0, 1920, 1080);
        let r = device_rect(&window, &display, 1.5);
        assert_eq!(r, Rect::new(630, 150, 600, 450));
    }

    #[test]
    fn device_rect_known_values() {
        let display = Rect::new(0, 0, 2560, 1440);
        let window = Rect::new(101, 51, 333, 222);
        assert_eq!(device_rect(&window, &display, 1.0), Rect::new(101, 51, 333, 222));
        assert_eq!(device_rect(&window, &display, 1.25), Rect::new(126, 64, 416, 278));
        assert_eq!(device_rect(&window, &display, 1.5), Rect::new(152, 77, 500, 333));
        assert_eq!(device_rect(&window, &display, 2.0), Rect::new(202, 102, 666, 444));
    }
}
