//! `rotate`: clockwise rotation by an arbitrary angle.

use super::calculations::{normalize_angle, rotated_bounds};
use super::{Args, Operation};
use crate::error::Result;
use crate::image::Image;
use crate::raster::{Color, PixelBuffer, Pixels};
use image::imageops;
use image::{ImageBuffer, Luma, Pixel, Rgba};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::debug;

pub struct Rotate;

impl Operation for Rotate {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("rotate");
        let angle = r.float_or(0, 0.0)?;
        let bg_color = r.color(1)?;
        let ignore_transparent = r.bool_or(2, true)?;
        rotate(image, angle, bg_color, ignore_transparent)
    }
}

/// Rotate `image` clockwise by `angle` degrees.
///
/// Quarter turns are exact and keep the size (swapped). Other angles grow the
/// canvas to the rotated bounding box and fill the uncovered corners with
/// `bg_color`; without one, a keyed image uses its key (when
/// `ignore_transparent`) and anything else gets a fully transparent fill.
pub fn rotate(
    image: &Image,
    angle: f64,
    bg_color: Option<Rgba<u8>>,
    ignore_transparent: bool,
) -> Result<Image> {
    let angle = normalize_angle(angle);
    let buffer = image.handle();

    let quarter = [0.0, 90.0, 180.0, 270.0]
        .into_iter()
        .find(|q| (angle - q).abs() < 1e-9);
    if let Some(q) = quarter {
        debug!(angle = q, "rotate by quarter turns");
        let pixels = match buffer.pixels() {
            Pixels::TrueColor(img) => Pixels::TrueColor(quarter_turn(img, q)),
            Pixels::Indexed { palette, indices } => Pixels::Indexed {
                palette: palette.clone(),
                indices: quarter_turn(indices, q),
            },
        };
        return Ok(Image::wrap(buffer.with_pixels(pixels)));
    }

    let (w, h) = image.dimensions();
    let (out_w, out_h) = rotated_bounds(w, h, angle);
    let projection = Projection::translate(out_w as f32 / 2.0, out_h as f32 / 2.0)
        * Projection::rotate((angle as f32).to_radians())
        * Projection::translate(-(w as f32) / 2.0, -(h as f32) / 2.0);
    debug!(angle, from = ?(w, h), to = ?(out_w, out_h), "rotate");

    let mut out = Image::wrap(buffer.blank_like(out_w, out_h)?);
    let keyed_background = if ignore_transparent {
        image.transparent_color()
    } else {
        None
    };

    match buffer.pixels() {
        Pixels::TrueColor(img) => {
            let background = bg_color
                .or_else(|| keyed_background.map(Color::to_rgba))
                .unwrap_or(Rgba([0, 0, 0, 0]));
            let mut target = ImageBuffer::from_pixel(out_w, out_h, background);
            warp_into(img, &projection, Interpolation::Bilinear, background, &mut target);
            *out.handle_mut().pixels_mut() = Pixels::TrueColor(target);
        }
        Pixels::Indexed { indices, .. } => {
            let background = match (bg_color, keyed_background) {
                (Some(rgba), _) => out.allocate_color_or_closest(rgba),
                (None, Some(key)) => key,
                (None, None) => {
                    let clear = match clear_entry(out.handle()) {
                        Some(existing) => existing,
                        None => out.allocate_color(Rgba([0, 0, 0, 0]))?,
                    };
                    out.set_transparent_color(Some(clear));
                    clear
                }
            };
            let fill = Luma([background.0 as u8]);
            let mut target = ImageBuffer::from_pixel(out_w, out_h, fill);
            warp_into(indices, &projection, Interpolation::Nearest, fill, &mut target);
            if let Pixels::Indexed { indices, .. } = out.handle_mut().pixels_mut() {
                *indices = target;
            }
        }
    }
    Ok(out)
}

fn quarter_turn<P>(img: &ImageBuffer<P, Vec<u8>>, degrees: f64) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    match degrees as u32 {
        90 => imageops::rotate90(img),
        180 => imageops::rotate180(img),
        270 => imageops::rotate270(img),
        _ => img.clone(),
    }
}

/// First fully transparent palette entry, if any.
fn clear_entry(buffer: &PixelBuffer) -> Option<Color> {
    match buffer.pixels() {
        Pixels::Indexed { palette, .. } => palette
            .entries()
            .iter()
            .position(|e| e.0[3] == 0)
            .map(|i| Color(i as u32)),
        Pixels::TrueColor(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::raster::{ColorMode, Palette};
    use crate::test_helpers::*;
    use image::{GrayImage, Luma};

    /// Indexed 6x6 image whose palette is full; `clear_at` makes one entry
    /// fully transparent.
    fn full_palette(clear_at: Option<usize>) -> Image {
        let entries = (0..=255u8)
            .map(|i| {
                let alpha = if clear_at == Some(i as usize) { 0 } else { 255 };
                Rgba([i, 255 - i, i / 2, alpha])
            })
            .collect();
        let palette = Palette::from_entries(entries).unwrap();
        let indices = GrayImage::from_pixel(6, 6, Luma([10]));
        Image::from_handle(PixelBuffer::from_indexed(palette, indices, None).unwrap()).unwrap()
    }

    fn marked() -> Image {
        // 4x2, red top-left pixel, everything else blue
        from_fn(4, 2, |x, y| if x == 0 && y == 0 { RED } else { BLUE })
    }

    #[test]
    fn zero_is_a_copy() {
        let img = marked();
        assert_eq!(rotate(&img, 0.0, None, true).unwrap(), img);
        assert_eq!(rotate(&img, 360.0, None, true).unwrap(), img);
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        let out = rotate(&marked(), 90.0, None, true).unwrap();
        assert_eq!(out.dimensions(), (2, 4));
        // top-left moves to top-right
        assert_eq!(out.rgba_at(1, 0), RED);
        assert_eq!(out.rgba_at(0, 0), BLUE);
    }

    #[test]
    fn negative_quarter_turn_is_counter_clockwise() {
        let out = rotate(&marked(), -90.0, None, true).unwrap();
        // top-left moves to bottom-left
        assert_eq!(out.rgba_at(0, 3), RED);
    }

    #[test]
    fn free_angle_grows_canvas_with_transparent_corners() {
        let img = solid(10, 10, RED);
        let out = rotate(&img, 45.0, None, true).unwrap();
        assert_eq!(out.dimensions(), (15, 15));
        assert_eq!(out.rgba_at(0, 0).0[3], 0);
        assert_eq!(out.rgba_at(7, 7), RED);
    }

    #[test]
    fn free_angle_uses_background_color() {
        let out = rotate(&solid(10, 10, RED), 30.0, Some(WHITE), true).unwrap();
        assert_eq!(out.rgba_at(0, 0), WHITE);
    }

    #[test]
    fn palette_rotation_stays_palette() {
        let img = keyed_palette(10, 10);
        let out = rotate(&img, 45.0, None, true).unwrap();
        assert_eq!(out.color_mode(), ColorMode::Indexed);
        assert_eq!(out.color_at(0, 0), palette_key());
        let quarter = rotate(&img, 180.0, None, true).unwrap();
        assert_eq!(quarter.color_at(0, 0), palette_key());
        assert_eq!(quarter.rgba_at(9, 0), WHITE);
    }

    #[test]
    fn palette_rotation_without_key_adds_one() {
        let mut img = Image::create_indexed(6, 6).unwrap();
        img.allocate_color(BLUE).unwrap();
        let out = rotate(&img, 20.0, None, true).unwrap();
        let key = out.transparent_color().unwrap();
        assert_eq!(out.color_at(0, 0), key);
        assert_eq!(out.color_rgba(key).0[3], 0);
    }

    #[test]
    fn full_palette_reuses_a_clear_entry_as_key() {
        let out = rotate(&full_palette(Some(200)), 20.0, None, true).unwrap();
        assert_eq!(out.transparent_color(), Some(Color(200)));
        assert_eq!(out.color_at(0, 0), Color(200));
    }

    #[test]
    fn full_opaque_palette_cannot_gain_a_key() {
        let err = rotate(&full_palette(None), 20.0, None, true).unwrap_err();
        assert!(matches!(err, Error::PaletteExhausted(256)));
    }
}
