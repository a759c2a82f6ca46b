//! Pixel-level primitives that the image layer is built on.
//!
//! A [`PixelBuffer`] is the raw pixel handle: either an RGBA8 true-color plane
//! or an 8-bit index plane over a [`Palette`] of at most 256 entries. Colors
//! are addressed through opaque [`Color`] handles whose meaning depends on the
//! buffer: a palette index for indexed buffers, packed RGBA otherwise.
//!
//! | Primitive | Where |
//! |---|---|
//! | create / validate / get / set pixel | this module |
//! | color allocate / exact / closest | this module + [`palette`] |
//! | quantise true color → palette | [`palette::quantize`] (median cut + `image::imageops::dither`) |
//! | raw blit, merge blit, flood fill | [`blit`] |
//! | built-in filters, 3x3 convolution, gamma | [`filter`] |

pub mod blit;
pub mod filter;
pub mod palette;

use crate::error::{Error, Result};
use image::{GrayImage, Rgba, RgbaImage};

pub use palette::{MAX_PALETTE_SIZE, Palette};

/// Color handle, only meaningful for the buffer that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    /// Pack an RGBA value (true-color handles).
    pub fn from_rgba(rgba: Rgba<u8>) -> Self {
        Color(u32::from_be_bytes(rgba.0))
    }

    /// Unpack a true-color handle.
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba(self.0.to_be_bytes())
    }

    /// Palette slot of an indexed handle.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    TrueColor,
    Indexed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    TrueColor(RgbaImage),
    Indexed { palette: Palette, indices: GrayImage },
}

/// Raw pixel storage plus transparency bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pixels: Pixels,
    transparent: Option<Color>,
    alpha_blending: bool,
    save_alpha: bool,
}

const OPAQUE_BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::dimension(format!(
            "{width}x{height}: width and height must be positive"
        )));
    }
    let bytes = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4));
    if bytes.is_none() {
        return Err(Error::dimension(format!("{width}x{height}: too large")));
    }
    Ok(())
}

/// Narrow resolved sides to a buffer size, rejecting anything that is not
/// positive or does not fit.
pub fn checked_dimensions(width: i64, height: i64) -> Result<(u32, u32)> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => {
            check_dimensions(w, h)?;
            Ok((w, h))
        }
        _ => Err(Error::dimension(format!(
            "{width}x{height}: sides must be between 1 and {}",
            u32::MAX
        ))),
    }
}

impl PixelBuffer {
    /// Opaque black true-color buffer.
    pub fn new_true_color(width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        Ok(Self::from_pixels(Pixels::TrueColor(RgbaImage::from_pixel(
            width,
            height,
            OPAQUE_BLACK,
        ))))
    }

    /// Indexed buffer with an empty palette; every pixel refers to slot 0, so
    /// the first allocated color becomes the background.
    pub fn new_indexed(width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        Ok(Self::from_pixels(Pixels::Indexed {
            palette: Palette::new(),
            indices: GrayImage::new(width, height),
        }))
    }

    pub fn from_rgba(image: RgbaImage) -> Result<Self> {
        check_dimensions(image.width(), image.height())?;
        Ok(Self::from_pixels(Pixels::TrueColor(image)))
    }

    pub fn from_indexed(
        palette: Palette,
        indices: GrayImage,
        transparent: Option<u8>,
    ) -> Result<Self> {
        let mut buffer = Self::from_pixels(Pixels::Indexed { palette, indices });
        buffer.transparent = transparent.map(|i| Color(i.into()));
        buffer.validate()?;
        Ok(buffer)
    }

    fn from_pixels(pixels: Pixels) -> Self {
        Self {
            pixels,
            transparent: None,
            alpha_blending: false,
            save_alpha: true,
        }
    }

    /// Reject buffers that cannot back an image.
    pub fn validate(&self) -> Result<()> {
        let (w, h) = self.dimensions();
        if w == 0 || h == 0 {
            return Err(Error::InvalidImageHandle(format!("{w}x{h} buffer")));
        }
        if let Pixels::Indexed { palette, .. } = &self.pixels {
            if palette.len() > MAX_PALETTE_SIZE {
                return Err(Error::InvalidImageHandle(format!(
                    "palette has {} entries",
                    palette.len()
                )));
            }
            if let Some(key) = self.transparent.filter(|k| k.index() >= palette.len()) {
                return Err(Error::InvalidImageHandle(format!(
                    "transparent index {} outside palette of {}",
                    key.0,
                    palette.len()
                )));
            }
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match &self.pixels {
            Pixels::TrueColor(img) => img.dimensions(),
            Pixels::Indexed { indices, .. } => indices.dimensions(),
        }
    }

    pub fn color_mode(&self) -> ColorMode {
        match self.pixels {
            Pixels::TrueColor(_) => ColorMode::TrueColor,
            Pixels::Indexed { .. } => ColorMode::Indexed,
        }
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut Pixels {
        &mut self.pixels
    }

    pub fn transparent(&self) -> Option<Color> {
        self.transparent
    }

    pub fn set_transparent(&mut self, color: Option<Color>) {
        self.transparent = color;
    }

    pub fn alpha_blending(&self) -> bool {
        self.alpha_blending
    }

    pub fn set_alpha_blending(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.alpha_blending, on)
    }

    pub fn save_alpha(&self) -> bool {
        self.save_alpha
    }

    pub fn set_save_alpha(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.save_alpha, on)
    }

    /// Same mode and flags, new pixels of the given size. Indexed buffers keep
    /// their palette and key.
    pub fn blank_like(&self, width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        let pixels = match &self.pixels {
            Pixels::TrueColor(_) => {
                Pixels::TrueColor(RgbaImage::from_pixel(width, height, OPAQUE_BLACK))
            }
            Pixels::Indexed { palette, .. } => Pixels::Indexed {
                palette: palette.clone(),
                indices: GrayImage::new(width, height),
            },
        };
        Ok(self.with_pixels(pixels))
    }

    /// Replace the pixel planes, keeping key and flags.
    pub fn with_pixels(&self, pixels: Pixels) -> Self {
        Self {
            pixels,
            transparent: self.transparent,
            alpha_blending: self.alpha_blending,
            save_alpha: self.save_alpha,
        }
    }

    // ------------------------------------------------------------------
    // Colors
    // ------------------------------------------------------------------

    /// RGBA value behind a handle. Unused palette slots read as opaque black.
    pub fn rgba_of(&self, color: Color) -> Rgba<u8> {
        match &self.pixels {
            Pixels::TrueColor(_) => color.to_rgba(),
            Pixels::Indexed { palette, .. } => palette.get(color.index()).unwrap_or(OPAQUE_BLACK),
        }
    }

    /// Handle for `rgba`, adding a palette entry when needed.
    pub fn allocate(&mut self, rgba: Rgba<u8>) -> Result<Color> {
        match &mut self.pixels {
            Pixels::TrueColor(_) => Ok(Color::from_rgba(rgba)),
            Pixels::Indexed { palette, .. } => {
                if let Some(i) = palette.exact(rgba) {
                    return Ok(Color(i.into()));
                }
                palette.push(rgba).map(|i| Color(i.into()))
            }
        }
    }

    pub fn exact(&self, rgba: Rgba<u8>) -> Option<Color> {
        match &self.pixels {
            Pixels::TrueColor(_) => Some(Color::from_rgba(rgba)),
            Pixels::Indexed { palette, .. } => palette.exact(rgba).map(|i| Color(i.into())),
        }
    }

    /// Nearest handle; an empty palette yields slot 0.
    pub fn closest(&self, rgba: Rgba<u8>) -> Color {
        match &self.pixels {
            Pixels::TrueColor(_) => Color::from_rgba(rgba),
            Pixels::Indexed { palette, .. } => Color(palette.closest(rgba).unwrap_or(0).into()),
        }
    }

    /// Exact match, else a new entry, else the closest entry.
    pub fn resolve(&mut self, rgba: Rgba<u8>) -> Color {
        match self.allocate(rgba) {
            Ok(color) => color,
            Err(_) => self.closest(rgba),
        }
    }

    // ------------------------------------------------------------------
    // Pixels
    // ------------------------------------------------------------------

    pub fn get(&self, x: u32, y: u32) -> Color {
        match &self.pixels {
            Pixels::TrueColor(img) => Color::from_rgba(*img.get_pixel(x, y)),
            Pixels::Indexed { indices, .. } => Color(indices.get_pixel(x, y).0[0].into()),
        }
    }

    pub fn get_rgba(&self, x: u32, y: u32) -> Rgba<u8> {
        match &self.pixels {
            Pixels::TrueColor(img) => *img.get_pixel(x, y),
            Pixels::Indexed { palette, indices } => palette
                .get(indices.get_pixel(x, y).0[0].into())
                .unwrap_or(OPAQUE_BLACK),
        }
    }

    /// Write a handle; true-color buffers blend when alpha blending is on.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        match &mut self.pixels {
            Pixels::TrueColor(img) => {
                let src = color.to_rgba();
                let out = if self.alpha_blending {
                    blit::over(*img.get_pixel(x, y), src)
                } else {
                    src
                };
                img.put_pixel(x, y, out);
            }
            Pixels::Indexed { indices, .. } => {
                indices.put_pixel(x, y, image::Luma([color.0.min(255) as u8]));
            }
        }
    }

    /// Write a handle without blending.
    pub fn put(&mut self, x: u32, y: u32, color: Color) {
        match &mut self.pixels {
            Pixels::TrueColor(img) => img.put_pixel(x, y, color.to_rgba()),
            Pixels::Indexed { indices, .. } => {
                indices.put_pixel(x, y, image::Luma([color.0.min(255) as u8]))
            }
        }
    }

    pub fn is_key(&self, color: Color) -> bool {
        self.transparent == Some(color)
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// RGBA plane as stored: palette colors expanded, key untouched.
    pub fn to_rgba_image(&self) -> RgbaImage {
        match &self.pixels {
            Pixels::TrueColor(img) => img.clone(),
            Pixels::Indexed { .. } => {
                let (w, h) = self.dimensions();
                RgbaImage::from_fn(w, h, |x, y| self.get_rgba(x, y))
            }
        }
    }

    /// RGBA plane as an encoder should see it: key pixels fully transparent,
    /// alpha dropped when `save_alpha` is off.
    pub fn to_export_rgba(&self) -> RgbaImage {
        let (w, h) = self.dimensions();
        let keep_alpha = self.save_alpha || self.color_mode() == ColorMode::Indexed;
        RgbaImage::from_fn(w, h, |x, y| {
            if self.is_key(self.get(x, y)) {
                let mut px = self.get_rgba(x, y);
                px.0[3] = 0;
                return px;
            }
            let mut px = self.get_rgba(x, y);
            if !keep_alpha {
                px.0[3] = 255;
            }
            px
        })
    }

    /// True-color copy. Key pixels of an indexed buffer become alpha 0 and the
    /// key carries over as that RGBA value.
    pub fn to_true_color(&self) -> PixelBuffer {
        match &self.pixels {
            Pixels::TrueColor(_) => self.clone(),
            Pixels::Indexed { .. } => {
                let key_rgba = self.transparent.map(|key| {
                    let mut rgba = self.rgba_of(key);
                    rgba.0[3] = 0;
                    rgba
                });
                let (w, h) = self.dimensions();
                let img = RgbaImage::from_fn(w, h, |x, y| match key_rgba {
                    Some(rgba) if self.is_key(self.get(x, y)) => rgba,
                    _ => self.get_rgba(x, y),
                });
                let mut out = self.with_pixels(Pixels::TrueColor(img));
                out.transparent = key_rgba.map(Color::from_rgba);
                out.alpha_blending = false;
                out.save_alpha = true;
                out
            }
        }
    }

    /// Palette copy with at most `max_colors` opaque entries (plus one
    /// transparent slot when the image has transparent pixels).
    pub fn to_indexed(&self, max_colors: usize, dither: bool, match_palette: bool) -> PixelBuffer {
        let key = self.transparent.map(|k| self.rgba_of(k));
        let rgba = match &self.pixels {
            Pixels::TrueColor(img) => img.clone(),
            Pixels::Indexed { .. } => self.to_true_color().to_rgba_image(),
        };
        let q = palette::quantize(&rgba, key, max_colors, dither, match_palette);
        let mut out = self.with_pixels(Pixels::Indexed {
            palette: q.palette,
            indices: q.indices,
        });
        out.transparent = q.transparent.map(|i| Color(i.into()));
        out
    }
}
