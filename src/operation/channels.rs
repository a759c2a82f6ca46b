//! `copy_channels`: keep a subset of the RGBA channels.

use super::{Args, Operation};
use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::{Color, Palette, Pixels};
use image::Rgba;

pub struct CopyChannels;

impl Operation for CopyChannels {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let names = args.reader("copy_channels").texts_from(0)?;
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        copy_channels(image, &names)
    }
}

/// Which channels survive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Keep {
    rgb: [bool; 3],
    alpha: bool,
}

impl Keep {
    fn parse(names: &[&str]) -> Result<Self> {
        let mut keep = Keep::default();
        for name in names {
            match name.trim().to_ascii_lowercase().as_str() {
                "red" | "r" => keep.rgb[0] = true,
                "green" | "g" => keep.rgb[1] = true,
                "blue" | "b" => keep.rgb[2] = true,
                "alpha" | "a" => keep.alpha = true,
                other => {
                    return Err(Error::invalid_argument(
                        "copy_channels",
                        format!("unknown channel '{other}'"),
                    ));
                }
            }
        }
        Ok(keep)
    }

    fn apply(self, px: Rgba<u8>) -> Rgba<u8> {
        let c = |i: usize| if self.rgb[i] { px.0[i] } else { 0 };
        Rgba([c(0), c(1), c(2), if self.alpha { px.0[3] } else { 255 }])
    }
}

/// Zero every RGB channel not named and make alpha opaque unless `alpha`
/// is named. Palette images are rewritten through their palette and keep
/// their key.
pub fn copy_channels(image: &Image, names: &[&str]) -> Result<Image> {
    let keep = Keep::parse(names)?;
    let buffer = image.handle();
    let mut out = match buffer.pixels() {
        Pixels::Indexed { palette, indices } => {
            let key = buffer.transparent().map(Color::index);
            let entries = palette
                .entries()
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    let mut mapped = keep.apply(*e);
                    if Some(i) == key {
                        mapped.0[3] = e.0[3];
                    }
                    mapped
                })
                .collect();
            Image::wrap(buffer.with_pixels(Pixels::Indexed {
                palette: Palette::from_entries(entries)?,
                indices: indices.clone(),
            }))
        }
        Pixels::TrueColor(img) => {
            let mut img = img.clone();
            for px in img.pixels_mut() {
                *px = keep.apply(*px);
            }
            Image::wrap(buffer.with_pixels(Pixels::TrueColor(img)))
        }
    };
    if image.is_true_color() {
        let key = image.transparent_color().map(|k| Color::from_rgba(keep.apply(k.to_rgba())));
        out.set_transparent_color(key);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ColorMode;
    use crate::test_helpers::*;

    #[test]
    fn keeps_named_channels_only() {
        let img = solid(2, 2, Rgba([10, 20, 30, 40]));
        let out = copy_channels(&img, &["red", "blue"]).unwrap();
        assert_eq!(out.rgba_at(0, 0), Rgba([10, 0, 30, 255]));
        let out = copy_channels(&img, &["green", "alpha"]).unwrap();
        assert_eq!(out.rgba_at(0, 0), Rgba([0, 20, 0, 40]));
    }

    #[test]
    fn palette_keeps_mode_and_key() {
        let img = keyed_palette(4, 1);
        let out = copy_channels(&img, &["blue"]).unwrap();
        assert_eq!(out.color_mode(), ColorMode::Indexed);
        assert_eq!(out.rgba_at(0, 0), Rgba([0, 0, 255, 255]));
        assert_eq!(out.transparent_rgba(), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let err = copy_channels(&solid(1, 1, RED), &["purple"]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn registry_reads_channel_names() {
        let ops = super::super::OperationRegistry::with_builtins();
        let args = Args::new().with("red");
        let out = ops.apply("copy_channels", &solid(1, 1, WHITE), &args).unwrap();
        assert_eq!(out.rgba_at(0, 0), RED);
    }
}
