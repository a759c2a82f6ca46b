//! Built-in pixel filters, 3x3 convolution and gamma correction.
//!
//! Everything here maps an RGBA plane to a new RGBA plane. Alpha is carried
//! from the source pixel unless the filter says otherwise.

use crate::error::{Error, Result};
use image::{Rgba, RgbaImage};

pub type Kernel = [[f32; 3]; 3];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    Negate,
    Grayscale,
    /// Added to each RGB channel, -255..=255.
    Brightness(i32),
    /// -100..=100, positive lowers contrast.
    Contrast(i32),
    /// Added to each RGB channel; positive `a` makes pixels more transparent.
    Colorize { r: i32, g: i32, b: i32, a: i32 },
    EdgeDetect,
    Emboss,
    GaussianBlur,
    SelectiveBlur,
    MeanRemoval,
    /// Weight of the centre pixel in a 3x3 average.
    Smooth(f32),
    Pixelate { block: u32, advanced: bool },
}

impl Filter {
    /// Build a filter from its name and up to four numeric arguments.
    ///
    /// Names are matched case-insensitively, ignoring underscores and an
    /// `img_filter_` prefix, so `edge_detect`, `EdgeDetect` and
    /// `IMG_FILTER_EDGEDETECT` are the same filter.
    pub fn parse(name: &str, args: &[f64]) -> Result<Self> {
        let key: String = name
            .to_ascii_lowercase()
            .trim_start_matches("img_filter_")
            .chars()
            .filter(|c| *c != '_')
            .collect();
        let arg = |i: usize| args.get(i).copied().unwrap_or(0.0);
        let filter = match key.as_str() {
            "negate" => Filter::Negate,
            "grayscale" | "greyscale" => Filter::Grayscale,
            "brightness" => Filter::Brightness(arg(0) as i32),
            "contrast" => Filter::Contrast(arg(0) as i32),
            "colorize" | "colourise" => Filter::Colorize {
                r: arg(0) as i32,
                g: arg(1) as i32,
                b: arg(2) as i32,
                a: arg(3) as i32,
            },
            "edgedetect" => Filter::EdgeDetect,
            "emboss" => Filter::Emboss,
            "gaussianblur" => Filter::GaussianBlur,
            "selectiveblur" => Filter::SelectiveBlur,
            "meanremoval" => Filter::MeanRemoval,
            "smooth" => Filter::Smooth(arg(0) as f32),
            "pixelate" => Filter::Pixelate {
                block: arg(0).max(0.0) as u32,
                advanced: arg(1) != 0.0,
            },
            _ => {
                return Err(Error::invalid_argument(
                    "apply_filter",
                    format!("unknown filter '{name}'"),
                ));
            }
        };
        Ok(filter)
    }

    pub fn apply(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let out = match *self {
            Filter::Negate => map_rgb(image, |c| 255 - c),
            Filter::Grayscale => grayscale(image),
            Filter::Brightness(level) => {
                let level = level.clamp(-255, 255);
                map_rgb(image, |c| clamp_u8(c as i32 + level))
            }
            Filter::Contrast(level) => contrast(image, level),
            Filter::Colorize { r, g, b, a } => colorize(image, [r, g, b], a),
            Filter::EdgeDetect => convolve(
                image,
                [[-1.0, 0.0, -1.0], [0.0, 4.0, 0.0], [-1.0, 0.0, -1.0]],
                1.0,
                127.0,
            )?,
            Filter::Emboss => convolve(
                image,
                [[1.5, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, -1.5]],
                1.0,
                127.0,
            )?,
            Filter::GaussianBlur => convolve(
                image,
                [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]],
                16.0,
                0.0,
            )?,
            Filter::SelectiveBlur => selective_blur(image),
            Filter::MeanRemoval => convolve(
                image,
                [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]],
                1.0,
                0.0,
            )?,
            Filter::Smooth(weight) => convolve(
                image,
                [[1.0, 1.0, 1.0], [1.0, weight, 1.0], [1.0, 1.0, 1.0]],
                weight + 8.0,
                0.0,
            )
            .map_err(|_| Error::invalid_argument("apply_filter", "smooth weight of -8"))?,
            Filter::Pixelate { block, advanced } => pixelate(image, block, advanced),
        };
        Ok(out)
    }
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn map_rgb(image: &RgbaImage, f: impl Fn(u8) -> u8) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        for c in &mut px.0[..3] {
            *c = f(*c);
        }
    }
    out
}

/// 0.299 R + 0.587 G + 0.114 B, truncated.
pub fn luma(px: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = px.0;
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8
}

fn grayscale(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        let y = luma(px);
        px.0[..3].fill(y);
    }
    out
}

fn contrast(image: &RgbaImage, level: i32) -> RgbaImage {
    let factor = (100.0 - level.clamp(-100, 100) as f64) / 100.0;
    let factor = factor * factor;
    map_rgb(image, |c| {
        let v = ((c as f64 / 255.0 - 0.5) * factor + 0.5) * 255.0;
        v.clamp(0.0, 255.0) as u8
    })
}

fn colorize(image: &RgbaImage, rgb: [i32; 3], a: i32) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        for (c, delta) in px.0[..3].iter_mut().zip(rgb) {
            *c = clamp_u8(*c as i32 + delta);
        }
        px.0[3] = clamp_u8(px.0[3] as i32 - a);
    }
    out
}

fn clamped(image: &RgbaImage, x: i64, y: i64) -> &Rgba<u8> {
    let x = x.clamp(0, image.width() as i64 - 1) as u32;
    let y = y.clamp(0, image.height() as i64 - 1) as u32;
    image.get_pixel(x, y)
}

/// `sum(kernel * neighbourhood) / divisor + offset` per RGB channel.
///
/// Edge pixels repeat the border; alpha comes from the centre pixel.
pub fn convolve(image: &RgbaImage, kernel: Kernel, divisor: f32, offset: f32) -> Result<RgbaImage> {
    if divisor == 0.0 || !divisor.is_finite() {
        return Err(Error::invalid_argument(
            "apply_convolution",
            "divisor must be non-zero",
        ));
    }
    let (w, h) = image.dimensions();
    Ok(RgbaImage::from_fn(w, h, |x, y| {
        let mut sum = [0.0f32; 3];
        for (ky, row) in kernel.iter().enumerate() {
            for (kx, weight) in row.iter().enumerate() {
                let px = clamped(image, x as i64 + kx as i64 - 1, y as i64 + ky as i64 - 1);
                for (s, c) in sum.iter_mut().zip(px.0) {
                    *s += weight * c as f32;
                }
            }
        }
        let alpha = image.get_pixel(x, y).0[3];
        let ch = |s: f32| (s / divisor + offset).clamp(0.0, 255.0) as u8;
        Rgba([ch(sum[0]), ch(sum[1]), ch(sum[2]), alpha])
    }))
}

/// Blur that weights neighbours by similarity to the centre pixel.
fn selective_blur(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    RgbaImage::from_fn(w, h, |x, y| {
        let centre = image.get_pixel(x, y);
        let mut weights = [[0.0f32; 3]; 3];
        let mut total = 0.0f32;
        for (j, row) in weights.iter_mut().enumerate() {
            for (i, weight) in row.iter_mut().enumerate() {
                if i == 1 && j == 1 {
                    continue;
                }
                let px = clamped(image, x as i64 + i as i64 - 1, y as i64 + j as i64 - 1);
                let diff: i32 = (0..3)
                    .map(|c| (centre.0[c] as i32 - px.0[c] as i32).abs())
                    .sum();
                *weight = if diff == 0 { 1.0 } else { 1.0 / diff as f32 };
                total += *weight;
            }
        }
        let mut sum = [0.0f32; 3];
        for (j, row) in weights.iter().enumerate() {
            for (i, weight) in row.iter().enumerate() {
                let weight = if i == 1 && j == 1 {
                    0.5
                } else {
                    0.5 * weight / total
                };
                let px = clamped(image, x as i64 + i as i64 - 1, y as i64 + j as i64 - 1);
                for (s, c) in sum.iter_mut().zip(px.0) {
                    *s += weight * c as f32;
                }
            }
        }
        let ch = |s: f32| s.round().clamp(0.0, 255.0) as u8;
        Rgba([ch(sum[0]), ch(sum[1]), ch(sum[2]), centre.0[3]])
    })
}

fn pixelate(image: &RgbaImage, block: u32, advanced: bool) -> RgbaImage {
    if block <= 1 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    for by in (0..h).step_by(block as usize) {
        for bx in (0..w).step_by(block as usize) {
            let bw = block.min(w - bx);
            let bh = block.min(h - by);
            let fill = if advanced {
                let mut sum = [0u64; 4];
                for y in by..by + bh {
                    for x in bx..bx + bw {
                        for (s, c) in sum.iter_mut().zip(image.get_pixel(x, y).0) {
                            *s += c as u64;
                        }
                    }
                }
                let n = (bw * bh) as u64;
                Rgba(sum.map(|s| (s / n) as u8))
            } else {
                *image.get_pixel(bx, by)
            };
            for y in by..by + bh {
                for x in bx..bx + bw {
                    out.put_pixel(x, y, fill);
                }
            }
        }
    }
    out
}

/// Lookup table for `round(255 * (c / 255) ^ (input / output))`.
pub fn gamma_table(input: f64, output: f64) -> Result<[u8; 256]> {
    if !(input > 0.0 && output > 0.0) {
        return Err(Error::invalid_argument(
            "correct_gamma",
            format!("gamma values must be positive (got {input}, {output})"),
        ));
    }
    let exponent = input / output;
    let mut table = [0u8; 256];
    for (c, out) in table.iter_mut().enumerate() {
        *out = (255.0 * (c as f64 / 255.0).powf(exponent)).round() as u8;
    }
    Ok(table)
}

/// Gamma correction of every RGB channel.
pub fn correct_gamma(image: &RgbaImage, input: f64, output: f64) -> Result<RgbaImage> {
    let table = gamma_table(input, output)?;
    Ok(map_rgb(image, |c| table[c as usize]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(3, 3, Rgba(rgba))
    }

    #[test]
    fn parse_accepts_name_variants() {
        assert_eq!(Filter::parse("edge_detect", &[]).unwrap(), Filter::EdgeDetect);
        assert_eq!(Filter::parse("EdgeDetect", &[]).unwrap(), Filter::EdgeDetect);
        assert_eq!(
            Filter::parse("IMG_FILTER_BRIGHTNESS", &[20.0]).unwrap(),
            Filter::Brightness(20)
        );
        assert!(matches!(
            Filter::parse("sharpen", &[]),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn negate_keeps_alpha() {
        let out = Filter::Negate.apply(&solid([10, 20, 30, 40])).unwrap();
        assert_eq!(*out.get_pixel(1, 1), Rgba([245, 235, 225, 40]));
    }

    #[test]
    fn grayscale_uses_luma_weights() {
        let out = Filter::Grayscale.apply(&solid([255, 0, 0, 255])).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([76, 76, 76, 255]));
    }

    #[test]
    fn brightness_clamps() {
        let out = Filter::Brightness(100).apply(&solid([200, 10, 0, 255])).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([255, 110, 100, 255]));
    }

    #[test]
    fn colorize_shifts_channels_and_alpha() {
        let f = Filter::Colorize {
            r: 10,
            g: -20,
            b: 0,
            a: 55,
        };
        let out = f.apply(&solid([100, 10, 50, 255])).unwrap();
        assert_eq!(*out.get_pixel(0, 0), Rgba([110, 0, 50, 200]));
    }

    #[test]
    fn blur_of_uniform_image_is_identity() {
        let img = solid([80, 90, 100, 255]);
        for f in [Filter::GaussianBlur, Filter::SelectiveBlur, Filter::Smooth(4.0)] {
            assert_eq!(f.apply(&img).unwrap(), img, "{f:?}");
        }
    }

    #[test]
    fn edge_detect_of_uniform_image_is_offset() {
        let out = Filter::EdgeDetect.apply(&solid([80, 90, 100, 255])).unwrap();
        assert_eq!(*out.get_pixel(1, 1), Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn zero_divisor_is_rejected() {
        let err = convolve(&solid([0, 0, 0, 255]), [[0.0; 3]; 3], 0.0, 0.0).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(Filter::Smooth(-8.0).apply(&solid([0, 0, 0, 255])).is_err());
    }

    #[test]
    fn convolution_identity_kernel() {
        let mut img = solid([1, 2, 3, 200]);
        img.put_pixel(1, 1, Rgba([50, 60, 70, 100]));
        let id = [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        assert_eq!(convolve(&img, id, 1.0, 0.0).unwrap(), img);
    }

    #[test]
    fn pixelate_basic_and_advanced() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([100, 100, 100, 255])
            }
        });
        let basic = Filter::Pixelate {
            block: 2,
            advanced: false,
        }
        .apply(&img)
        .unwrap();
        assert_eq!(*basic.get_pixel(1, 0), Rgba([0, 0, 0, 255]));
        let advanced = Filter::Pixelate {
            block: 2,
            advanced: true,
        }
        .apply(&img)
        .unwrap();
        assert_eq!(*advanced.get_pixel(1, 0), Rgba([50, 50, 50, 255]));
    }

    #[test]
    fn gamma_identity_and_darkening() {
        let img = solid([0, 128, 255, 77]);
        assert_eq!(correct_gamma(&img, 2.2, 2.2).unwrap(), img);
        let out = correct_gamma(&img, 2.0, 1.0).unwrap();
        // 255 * (128/255)^2 = 64.25
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 64, 255, 77]));
        assert!(correct_gamma(&img, 0.0, 1.0).is_err());
    }
}
