//! `resize`: scale to a box with a fit method and a scale restriction.

use super::calculations::{fit_dimensions, restrict_scale};
use super::{Args, Operation};
use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::{Pixels, checked_dimensions};
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How the source is fitted to the requested box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Largest size that fits within the box.
    #[default]
    Inside,
    /// Smallest size that covers the box.
    Outside,
    /// Exactly the box, ignoring the aspect ratio.
    Fill,
}

/// Which direction a resize may go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Any,
    /// Never enlarge.
    Down,
    /// Never shrink.
    Up,
}

impl Fit {
    pub fn as_str(self) -> &'static str {
        match self {
            Fit::Inside => "inside",
            Fit::Outside => "outside",
            Fit::Fill => "fill",
        }
    }
}

impl Scale {
    pub fn as_str(self) -> &'static str {
        match self {
            Scale::Any => "any",
            Scale::Down => "down",
            Scale::Up => "up",
        }
    }
}

impl FromStr for Fit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inside" => Ok(Fit::Inside),
            "outside" => Ok(Fit::Outside),
            "fill" => Ok(Fit::Fill),
            other => Err(Error::invalid_argument(
                "resize",
                format!("unknown fit '{other}' (expected inside, outside or fill)"),
            )),
        }
    }
}

impl FromStr for Scale {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Scale::Any),
            "down" => Ok(Scale::Down),
            "up" => Ok(Scale::Up),
            other => Err(Error::invalid_argument(
                "resize",
                format!("unknown scale '{other}' (expected any, down or up)"),
            )),
        }
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Resize;

impl Operation for Resize {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("resize");
        let fit = match r.text(2)? {
            Some(s) => s.parse()?,
            None => Fit::default(),
        };
        let scale = match r.text(3)? {
            Some(s) => s.parse()?,
            None => Scale::default(),
        };
        resize(image, r.coord(0)?.as_ref(), r.coord(1)?.as_ref(), fit, scale)
    }
}

/// Resize `image` to the box `width`×`height` (either may be omitted).
///
/// Palette and keyed images are resampled nearest-neighbour so no new colors
/// appear; everything else uses Lanczos3.
pub fn resize(
    image: &Image,
    width: Option<&Coordinate>,
    height: Option<&Coordinate>,
    fit: Fit,
    scale: Scale,
) -> Result<Image> {
    let source = image.dimensions();
    let width = width.map(|c| c.resolve(source.0)).transpose()?;
    let height = height.map(|c| c.resolve(source.1)).transpose()?;

    let target = fit_dimensions(source, width, height, fit);
    let (w, h) = restrict_scale(source, target, scale);
    let (w, h) = checked_dimensions(w, h).map_err(|_| {
        Error::dimension(format!("resize of {}x{} to {w}x{h}", source.0, source.1))
    })?;
    debug!(from = ?source, to = ?(w, h), %fit, %scale, "resize");

    let buffer = image.handle();
    let pixels = match buffer.pixels() {
        Pixels::Indexed { palette, indices } => Pixels::Indexed {
            palette: palette.clone(),
            indices: imageops::resize(indices, w, h, FilterType::Nearest),
        },
        Pixels::TrueColor(img) => {
            let filter = if image.is_transparent() {
                FilterType::Nearest
            } else {
                FilterType::Lanczos3
            };
            Pixels::TrueColor(imageops::resize(img, w, h, filter))
        }
    };
    Ok(Image::wrap(buffer.with_pixels(pixels)))
}
