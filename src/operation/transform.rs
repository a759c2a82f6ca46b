//! `mirror` (left-right) and `flip` (top-bottom).

use super::{Args, Operation};
use crate::error::Result;
use crate::image::Image;
use crate::raster::Pixels;
use image::imageops;

pub struct Mirror;

impl Operation for Mirror {
    fn execute(&self, image: &Image, _args: &Args<'_>) -> Result<Image> {
        Ok(mirror(image))
    }
}

pub struct Flip;

impl Operation for Flip {
    fn execute(&self, image: &Image, _args: &Args<'_>) -> Result<Image> {
        Ok(flip(image))
    }
}

pub fn mirror(image: &Image) -> Image {
    let buffer = image.handle();
    let pixels = match buffer.pixels() {
        Pixels::TrueColor(img) => Pixels::TrueColor(imageops::flip_horizontal(img)),
        Pixels::Indexed { palette, indices } => Pixels::Indexed {
            palette: palette.clone(),
            indices: imageops::flip_horizontal(indices),
        },
    };
    Image::wrap(buffer.with_pixels(pixels))
}

pub fn flip(image: &Image) -> Image {
    let buffer = image.handle();
    let pixels = match buffer.pixels() {
        Pixels::TrueColor(img) => Pixels::TrueColor(imageops::flip_vertical(img)),
        Pixels::Indexed { palette, indices } => Pixels::Indexed {
            palette: palette.clone(),
            indices: imageops::flip_vertical(indices),
        },
    };
    Image::wrap(buffer.with_pixels(pixels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ColorMode;
    use crate::test_helpers::*;

    #[test]
    fn mirror_swaps_columns() {
        let img = from_fn(3, 2, |x, _| if x == 0 { RED } else { BLUE });
        let out = mirror(&img);
        assert_eq!(out.rgba_at(2, 0), RED);
        assert_eq!(out.rgba_at(0, 1), BLUE);
        assert_eq!(mirror(&out), img);
    }

    #[test]
    fn flip_swaps_rows() {
        let img = from_fn(2, 3, |_, y| if y == 0 { RED } else { BLUE });
        let out = flip(&img);
        assert_eq!(out.rgba_at(0, 2), RED);
        assert_eq!(out.rgba_at(1, 0), BLUE);
        assert_eq!(flip(&out), img);
    }

    #[test]
    fn palette_images_keep_mode_and_key() {
        let img = keyed_palette(4, 2);
        let out = mirror(&img);
        assert_eq!(out.color_mode(), ColorMode::Indexed);
        assert_eq!(out.color_at(0, 0), palette_key());
        assert_eq!(out.rgba_at(3, 0), WHITE);
        assert_eq!(flip(&img).transparent_color(), Some(palette_key()));
    }
}
