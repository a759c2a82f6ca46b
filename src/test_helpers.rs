//! Shared test utilities: synthetic images and assertion helpers.
//!
//! ```text
//! use crate::test_helpers::*;
//!
//! let base = solid(100, 100, WHITE);
//! let overlay = solid(50, 50, RED);
//! assert_region(&out, (25, 25, 50, 50), RED);
//! ```

use crate::image::{Image, ResponseSink};
use crate::raster::{Color, Palette, PixelBuffer};
use image::{GrayImage, Luma, Rgba, RgbaImage};

pub const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

// =========================================================================
// Synthetic images
// =========================================================================

/// True-color image filled with one color.
pub fn solid(width: u32, height: u32, rgba: Rgba<u8>) -> Image {
    from_fn(width, height, |_, _| rgba)
}

pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> Rgba<u8>) -> Image {
    let buffer = PixelBuffer::from_rgba(RgbaImage::from_fn(width, height, f)).unwrap();
    Image::from_handle(buffer).unwrap()
}

/// Alternating 1px cells of `a` and `b`, `a` at the origin.
pub fn checkerboard(width: u32, height: u32, a: Rgba<u8>, b: Rgba<u8>) -> Image {
    from_fn(width, height, |x, y| if (x + y) % 2 == 0 { a } else { b })
}

/// Horizontal red ramp: red = x * 255 / (width - 1).
pub fn gradient(width: u32, height: u32) -> Image {
    from_fn(width, height, |x, _| {
        let r = (x * 255 / (width - 1).max(1)) as u8;
        Rgba([r, 0, 0, 255])
    })
}

/// Palette image: left half white, right half the key color (pure green,
/// alpha 0). The key is palette index 1.
pub fn keyed_palette(width: u32, height: u32) -> Image {
    let palette = Palette::from_entries(vec![WHITE, Rgba([0, 255, 0, 0])]).unwrap();
    let indices = GrayImage::from_fn(width, height, |x, _| Luma([u8::from(x >= width / 2)]));
    let buffer = PixelBuffer::from_indexed(palette, indices, Some(1)).unwrap();
    Image::from_handle(buffer).unwrap()
}

/// The palette index used as key by [`keyed_palette`].
pub fn palette_key() -> Color {
    Color(1)
}

// =========================================================================
// Assertions
// =========================================================================

/// Assert every pixel of `(x, y, w, h)` has the given RGBA value.
pub fn assert_region(image: &Image, region: (u32, u32, u32, u32), rgba: Rgba<u8>) {
    let (x0, y0, w, h) = region;
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            assert_eq!(
                image.rgba_at(x, y),
                rgba,
                "pixel ({x}, {y}) outside expected color"
            );
        }
    }
}

// =========================================================================
// Sinks
// =========================================================================

/// [`ResponseSink`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponseSink for RecordingSink {
    fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn body(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}
