//! `crop` and `autocrop`.

use super::calculations::clip_crop;
use super::{Args, Operation};
use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::Pixels;
use image::Rgba;
use image::imageops;
use tracing::debug;

pub struct Crop;

impl Operation for Crop {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("crop");
        let left = r.coord_or(0, 0)?;
        let top = r.coord_or(1, 0)?;
        let width = r.coord_or(2, "100%")?;
        let height = r.coord_or(3, "100%")?;
        crop(image, &left, &top, &width, &height)
    }
}

/// Cut a rectangle out of `image`, clipped to its bounds.
///
/// `width`/`height` resolve against the image size; `left`/`top` resolve
/// with the crop size as the element, so `"c"` centres the rectangle.
pub fn crop(
    image: &Image,
    left: &Coordinate,
    top: &Coordinate,
    width: &Coordinate,
    height: &Coordinate,
) -> Result<Image> {
    let (iw, ih) = image.dimensions();
    let w = width.resolve(iw)?;
    let h = height.resolve(ih)?;
    let x = left.resolve_within(iw, w.clamp(0, u32::MAX as i64) as u32)?;
    let y = top.resolve_within(ih, h.clamp(0, u32::MAX as i64) as u32)?;

    let (x, y, w, h) = clip_crop((iw, ih), x, y, w, h).ok_or_else(|| {
        Error::dimension(format!(
            "crop {left},{top} {width}x{height} leaves nothing of {iw}x{ih}"
        ))
    })?;
    debug!(x, y, w, h, "crop");
    Ok(crop_rect(image, x, y, w, h))
}

/// Copy of an in-bounds rectangle in the same mode, palette and key.
pub(crate) fn crop_rect(image: &Image, x: u32, y: u32, w: u32, h: u32) -> Image {
    let buffer = image.handle();
    let pixels = match buffer.pixels() {
        Pixels::TrueColor(img) => Pixels::TrueColor(imageops::crop_imm(img, x, y, w, h).to_image()),
        Pixels::Indexed { palette, indices } => Pixels::Indexed {
            palette: palette.clone(),
            indices: imageops::crop_imm(indices, x, y, w, h).to_image(),
        },
    };
    Image::wrap(buffer.with_pixels(pixels))
}

pub struct AutoCrop;

impl Operation for AutoCrop {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("autocrop");
        let margin = r.int_or(0, 0)?;
        let rgb_threshold = r.int_or(1, 0)?;
        let pixel_cutoff = r.int_or(2, 1)?;
        let base_color = r.color(3)?;
        auto_crop(image, margin, rgb_threshold, pixel_cutoff, base_color)
    }
}

/// Trim borders of (nearly) `base_color`.
///
/// A row or column counts as content once at least `pixel_cutoff` of its
/// pixels differ from the base color by more than `rgb_threshold` (sum of
/// absolute RGB differences). The found box grows by `margin` on every side,
/// clamped to the image; a negative margin shrinks it. An image with no
/// content at all comes back as a copy.
pub fn auto_crop(
    image: &Image,
    margin: i64,
    rgb_threshold: i64,
    pixel_cutoff: i64,
    base_color: Option<Rgba<u8>>,
) -> Result<Image> {
    let (w, h) = image.dimensions();
    let base = base_color.unwrap_or_else(|| image.rgba_at(0, 0));
    let cutoff = pixel_cutoff.max(1) as usize;
    let differs = |x: u32, y: u32| {
        let px = image.rgba_at(x, y);
        let distance: i64 = (0..3)
            .map(|c| (px.0[c] as i64 - base.0[c] as i64).abs())
            .sum();
        distance > rgb_threshold
    };
    let row_has_content = |y: u32| (0..w).filter(|&x| differs(x, y)).count() >= cutoff;
    let col_has_content = |x: u32| (0..h).filter(|&y| differs(x, y)).count() >= cutoff;

    let Some(top) = (0..h).find(|&y| row_has_content(y)) else {
        debug!("autocrop found no content");
        return Ok(image.copy());
    };
    let bottom = (top..h).rev().find(|&y| row_has_content(y)).unwrap_or(top);
    let left = (0..w).find(|&x| col_has_content(x)).unwrap_or(0);
    let right = (left..w).rev().find(|&x| col_has_content(x)).unwrap_or(w - 1);

    let x0 = (left as i64 - margin).clamp(0, w as i64 - 1);
    let y0 = (top as i64 - margin).clamp(0, h as i64 - 1);
    let x1 = (right as i64 + margin).clamp(x0, w as i64 - 1);
    let y1 = (bottom as i64 + margin).clamp(y0, h as i64 - 1);
    debug!(x0, y0, x1, y1, "autocrop box");

    Ok(crop_rect(
        image,
        x0 as u32,
        y0 as u32,
        (x1 - x0 + 1) as u32,
        (y1 - y0 + 1) as u32,
    ))
}
