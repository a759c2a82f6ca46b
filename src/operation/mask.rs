//! `get_mask` and `apply_mask`: alpha channel out of and into an image.

use super::{Args, Operation};
use crate::coordinate::Coordinate;
use crate::error::Result;
use crate::image::Image;
use crate::raster::{Pixels, PixelBuffer};
use image::{Rgba, RgbaImage};

pub struct GetMask;

impl Operation for GetMask {
    fn execute(&self, image: &Image, _args: &Args<'_>) -> Result<Image> {
        get_mask(image)
    }
}

/// Grayscale image whose gray level is the source alpha. Key pixels are black.
pub fn get_mask(image: &Image) -> Result<Image> {
    let (w, h) = image.dimensions();
    let key = image.transparent_color();
    let mask = RgbaImage::from_fn(w, h, |x, y| {
        let alpha = if key == Some(image.color_at(x, y)) {
            0
        } else {
            image.rgba_at(x, y).0[3]
        };
        Rgba([alpha, alpha, alpha, 255])
    });
    Ok(Image::wrap(PixelBuffer::from_rgba(mask)?))
}

pub struct ApplyMask;

impl Operation for ApplyMask {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("apply_mask");
        let mask = r.image(0)?;
        let left = r.coord_or(1, 0)?;
        let top = r.coord_or(2, 0)?;
        apply_mask(image, mask, &left, &top)
    }
}

/// Scale the alpha of `image` by the red channel of `mask` placed at
/// `(left, top)`.
///
/// Under the mask, `alpha = round(red / 255 * alpha)`; black mask pixels and
/// mask key pixels make the pixel fully transparent. Pixels the mask does
/// not cover keep their alpha. The result is always true color.
pub fn apply_mask(
    image: &Image,
    mask: &Image,
    left: &Coordinate,
    top: &Coordinate,
) -> Result<Image> {
    let (w, h) = image.dimensions();
    let (mw, mh) = mask.dimensions();
    let left = left.resolve_within(w, mw)?;
    let top = top.resolve_within(h, mh)?;

    let mut result = image.as_true_color();
    let src_key = result.transparent_color();
    let mask_key = mask.transparent_color();
    if let Pixels::TrueColor(img) = result.handle_mut().pixels_mut() {
        for (x, y, px) in img.enumerate_pixels_mut() {
            if src_key.is_some_and(|k| k.to_rgba() == *px) {
                px.0[3] = 0;
                continue;
            }
            let mx = (x as i64).saturating_sub(left);
            let my = (y as i64).saturating_sub(top);
            if mx < 0 || my < 0 || mx >= mw as i64 || my >= mh as i64 {
                continue;
            }
            let (mx, my) = (mx as u32, my as u32);
            let level = mask.rgba_at(mx, my).0[0];
            if level == 0 || mask_key == Some(mask.color_at(mx, my)) {
                px.0[3] = 0;
            } else {
                px.0[3] = (level as f64 / 255.0 * px.0[3] as f64).round() as u8;
            }
        }
    }
    result.alpha_blending(false);
    result.save_alpha(true);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn mask_reads_alpha() {
        let img = from_fn(2, 1, |x, _| Rgba([9, 9, 9, if x == 0 { 40 } else { 255 }]));
        let mask = get_mask(&img).unwrap();
        assert_eq!(mask.rgba_at(0, 0), Rgba([40, 40, 40, 255]));
        assert_eq!(mask.rgba_at(1, 0), WHITE);
    }

    #[test]
    fn mask_of_keyed_palette_is_black_at_key() {
        let mask = get_mask(&keyed_palette(4, 1)).unwrap();
        assert_eq!(mask.rgba_at(0, 0), WHITE);
        assert_eq!(mask.rgba_at(3, 0), BLACK);
    }

    #[test]
    fn apply_scales_alpha_by_mask_red() {
        let img = solid(3, 1, RED);
        let mask = from_fn(3, 1, |x, _| match x {
            0 => BLACK,
            1 => Rgba([128, 0, 0, 255]),
            _ => WHITE,
        });
        let out = apply_mask(&img, &mask, &Coordinate::from(0), &Coordinate::from(0)).unwrap();
        assert_eq!(out.rgba_at(0, 0).0[3], 0);
        assert_eq!(out.rgba_at(1, 0).0[3], 128);
        assert_eq!(out.rgba_at(2, 0).0[3], 255);
    }

    #[test]
    fn pixels_outside_mask_are_untouched() {
        let img = solid(4, 4, RED);
        let mask = solid(2, 2, BLACK);
        let out = apply_mask(&img, &mask, &Coordinate::from("right"), &Coordinate::from(0)).unwrap();
        assert_eq!(out.rgba_at(0, 0), RED);
        assert_eq!(out.rgba_at(2, 0).0[3], 0);
        assert_eq!(out.rgba_at(3, 1).0[3], 0);
        assert_eq!(out.rgba_at(3, 2), RED);
    }

    #[test]
    fn mask_round_trip_restores_alpha() {
        let img = from_fn(8, 1, |x, _| Rgba([200, 100, 50, (x * 30) as u8]));
        let mask = get_mask(&img).unwrap();
        let opaque = img.copy_no_alpha();
        let out = apply_mask(&opaque, &mask, &Coordinate::from(0), &Coordinate::from(0)).unwrap();
        assert_eq!(out, img);
    }
}
