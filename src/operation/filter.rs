//! Pixel filters: `apply_filter`, `apply_convolution`, `as_grayscale`,
//! `unsharp` and `correct_gamma`.

use super::{Args, Operation};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::filter::{self, Filter, Kernel, luma};
use crate::raster::{Color, Palette, Pixels};
use image::{Rgba, RgbaImage, imageops};
use tracing::debug;

/// Run `f` over the true-color pixels of `image`. The result is true color
/// and carries no key: keyed pixels are already alpha 0 after conversion.
fn map_true_color(
    image: &Image,
    f: impl FnOnce(&RgbaImage) -> Result<RgbaImage>,
) -> Result<Image> {
    let source = image.as_true_color();
    let Pixels::TrueColor(img) = source.handle().pixels() else {
        return Err(Error::InvalidImageHandle(
            "true-color conversion produced a palette".into(),
        ));
    };
    let mut out = source.handle().with_pixels(Pixels::TrueColor(f(img)?));
    out.set_transparent(None);
    Ok(Image::wrap(out))
}

/// Replace every palette entry (key included) through `f`.
fn map_palette(image: &Image, f: impl Fn(Rgba<u8>) -> Rgba<u8>) -> Result<Option<Image>> {
    let Pixels::Indexed { palette, indices } = image.handle().pixels() else {
        return Ok(None);
    };
    let palette = Palette::from_entries(palette.entries().iter().map(|e| f(*e)).collect())?;
    let pixels = Pixels::Indexed {
        palette,
        indices: indices.clone(),
    };
    Ok(Some(Image::wrap(image.handle().with_pixels(pixels))))
}

pub struct ApplyFilter;

impl Operation for ApplyFilter {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("apply_filter");
        let name = r.text(0)?.ok_or_else(|| {
            Error::invalid_argument("apply_filter", "a filter name is required")
        })?;
        let numbers = r.floats_from(1)?;
        apply_filter(image, &Filter::parse(&name, &numbers)?)
    }
}

pub fn apply_filter(image: &Image, filter: &Filter) -> Result<Image> {
    debug!(?filter, "apply filter");
    map_true_color(image, |img| filter.apply(img))
}

pub struct ApplyConvolution;

impl Operation for ApplyConvolution {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("apply_convolution");
        let matrix = r.matrix(0)?.unwrap_or_default();
        let kernel = kernel_from(&matrix)?;
        let divisor = r.float_or(1, 1.0)? as f32;
        let offset = r.float_or(2, 0.0)? as f32;
        apply_convolution(image, kernel, divisor, offset)
    }
}

fn kernel_from(values: &[f32]) -> Result<Kernel> {
    match values {
        [a, b, c, d, e, f, g, h, i] => Ok([[*a, *b, *c], [*d, *e, *f], [*g, *h, *i]]),
        _ => Err(Error::invalid_argument(
            "apply_convolution",
            format!("matrix needs 9 values, got {}", values.len()),
        )),
    }
}

pub fn apply_convolution(image: &Image, kernel: Kernel, divisor: f32, offset: f32) -> Result<Image> {
    map_true_color(image, |img| filter::convolve(img, kernel, divisor, offset))
}

pub struct AsGrayscale;

impl Operation for AsGrayscale {
    fn execute(&self, image: &Image, _args: &Args<'_>) -> Result<Image> {
        as_grayscale(image)
    }
}

/// Luma grayscale; palette images stay palette images.
pub fn as_grayscale(image: &Image) -> Result<Image> {
    let gray = |px: Rgba<u8>| {
        let y = luma(&px);
        Rgba([y, y, y, px.0[3]])
    };
    if let Some(out) = map_palette(image, gray)? {
        return Ok(out);
    }
    let mut out = Image::wrap(
        image
            .handle()
            .with_pixels(Pixels::TrueColor(Filter::Grayscale.apply(
                &image.handle().to_rgba_image(),
            )?)),
    );
    if let Some(key) = image.transparent_color() {
        out.set_transparent_color(Some(Color::from_rgba(gray(key.to_rgba()))));
    }
    Ok(out)
}

pub struct Unsharp;

impl Operation for Unsharp {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("unsharp");
        let amount = r.float_or(0, 80.0)?;
        let radius = r.float_or(1, 0.5)?;
        let threshold = r.float_or(2, 3.0)?;
        unsharp(image, amount, radius, threshold)
    }
}

/// Unsharp mask.
///
/// `amount` (capped at 500) is scaled by 0.016, `radius` (capped at 50) is
/// the blur sigma, and channels whose difference from the blur is below
/// `threshold` (capped at 255) are left alone.
pub fn unsharp(image: &Image, amount: f64, radius: f64, threshold: f64) -> Result<Image> {
    let amount = amount.clamp(0.0, 500.0) * 0.016;
    let radius = radius.clamp(0.0, 50.0);
    let threshold = threshold.clamp(0.0, 255.0);
    debug!(amount, radius, threshold, "unsharp");

    map_true_color(image, |img| {
        if radius == 0.0 {
            return Ok(img.clone());
        }
        let blurred = imageops::blur(img, radius as f32);
        let mut out = img.clone();
        for (px, blur) in out.pixels_mut().zip(blurred.pixels()) {
            for (c, b) in px.0[..3].iter_mut().zip(&blur.0[..3]) {
                let diff = *c as f64 - *b as f64;
                if diff.abs() >= threshold {
                    *c = (*c as f64 + amount * diff).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
        Ok(out)
    })
}

pub struct CorrectGamma;

impl Operation for CorrectGamma {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("correct_gamma");
        let input = r.float_or(0, 1.0)?;
        let output = r.float_or(1, 1.0)?;
        correct_gamma(image, input, output)
    }
}

/// Gamma correction. Palette images are corrected through their palette.
pub fn correct_gamma(image: &Image, input: f64, output: f64) -> Result<Image> {
    let table = filter::gamma_table(input, output)?;
    let correct = |px: Rgba<u8>| {
        let [r, g, b, a] = px.0;
        Rgba([table[r as usize], table[g as usize], table[b as usize], a])
    };
    if let Some(out) = map_palette(image, correct)? {
        return Ok(out);
    }
    let mut img = image.handle().to_rgba_image();
    for px in img.pixels_mut() {
        *px = correct(*px);
    }
    let mut out = Image::wrap(image.handle().with_pixels(Pixels::TrueColor(img)));
    if let Some(key) = image.transparent_color() {
        out.set_transparent_color(Some(Color::from_rgba(correct(key.to_rgba()))));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ColorMode;
    use crate::test_helpers::*;

    #[test]
    fn filter_result_is_true_color() {
        let out = apply_filter(&keyed_palette(4, 4), &Filter::Negate).unwrap();
        assert_eq!(out.color_mode(), ColorMode::TrueColor);
        assert_eq!(out.rgba_at(0, 0), BLACK);
        // key pixels stay fully transparent
        assert_eq!(out.rgba_at(3, 0).0[3], 0);
    }

    #[test]
    fn filter_by_name_through_registry() {
        let ops = super::super::OperationRegistry::with_builtins();
        let args = Args::new().with("brightness").with(-55);
        let out = ops.apply("apply_filter", &solid(2, 2, WHITE), &args).unwrap();
        assert_eq!(out.rgba_at(1, 1), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn convolution_needs_nine_values() {
        let ops = super::super::OperationRegistry::with_builtins();
        let args = Args::new().with(vec![1.0f32; 4]).with(1.0).with(0.0);
        let err = ops.apply("apply_convolution", &solid(2, 2, WHITE), &args).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn convolution_zero_divisor_fails() {
        let err = apply_convolution(&solid(2, 2, WHITE), [[1.0; 3]; 3], 0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn grayscale_keeps_palette_mode() {
        let img = keyed_palette(4, 4);
        let out = as_grayscale(&img).unwrap();
        assert_eq!(out.color_mode(), ColorMode::Indexed);
        assert_eq!(out.transparent_color(), img.transparent_color());
        // luma of green 0.587 * 255 = 149.685
        assert_eq!(out.transparent_rgba(), Some(Rgba([149, 149, 149, 0])));
    }

    #[test]
    fn grayscale_of_true_color() {
        let out = as_grayscale(&solid(1, 1, BLUE)).unwrap();
        assert_eq!(out.rgba_at(0, 0), Rgba([29, 29, 29, 255]));
    }

    #[test]
    fn unsharp_leaves_flat_images_alone() {
        let img = solid(8, 8, Rgba([120, 60, 30, 255]));
        assert_eq!(unsharp(&img, 80.0, 2.0, 2.0).unwrap(), img);
    }

    #[test]
    fn unsharp_increases_edge_contrast() {
        let img = from_fn(10, 1, |x, _| {
            if x < 5 {
                Rgba([100, 100, 100, 255])
            } else {
                Rgba([150, 150, 150, 255])
            }
        });
        let out = unsharp(&img, 500.0, 1.0, 0.0).unwrap();
        assert!(out.rgba_at(4, 0).0[0] < 100);
        assert!(out.rgba_at(5, 0).0[0] > 150);
    }

    #[test]
    fn gamma_on_palette_changes_entries_only() {
        let mut img = Image::create_indexed(2, 1).unwrap();
        img.allocate_color(Rgba([128, 128, 128, 255])).unwrap();
        let out = correct_gamma(&img, 2.0, 1.0).unwrap();
        assert_eq!(out.color_mode(), ColorMode::Indexed);
        assert_eq!(out.rgba_at(1, 0), Rgba([64, 64, 64, 255]));
    }

    #[test]
    fn gamma_rejects_non_positive() {
        assert!(correct_gamma(&solid(1, 1, RED), -1.0, 1.0).is_err());
    }
}
