//! The image abstraction.
//!
//! An [`Image`] owns exactly one [`PixelBuffer`] and is valid for as long as
//! it exists. Dropping it frees the pixels; [`Image::release`] hands them out
//! instead. Operations never mutate their input: each returns a new image.

use crate::canvas::Canvas;
use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::mapper::{MapperRegistry, SaveOptions};
use crate::operation::resize::{Fit, Scale};
use crate::operation::{Args, OperationRegistry};
use crate::raster::blit::{self, Rect};
use crate::raster::filter::Filter;
use crate::raster::{Color, ColorMode, Palette, PixelBuffer, Pixels};
use image::Rgba;
use std::path::Path;
use tracing::debug;

/// Receiver of an encoded HTTP-style response.
pub trait ResponseSink {
    fn header(&mut self, name: &str, value: &str);
    fn body(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    buffer: PixelBuffer,
}

impl Image {
    /// Opaque black true-color image.
    pub fn create_true_color(width: u32, height: u32) -> Result<Self> {
        PixelBuffer::new_true_color(width, height).map(Self::wrap)
    }

    /// Palette image with an empty palette.
    pub fn create_indexed(width: u32, height: u32) -> Result<Self> {
        PixelBuffer::new_indexed(width, height).map(Self::wrap)
    }

    /// Take ownership of a raw buffer, rejecting unusable ones.
    pub fn from_handle(buffer: PixelBuffer) -> Result<Self> {
        buffer.validate()?;
        Ok(Self::wrap(buffer))
    }

    pub(crate) fn wrap(buffer: PixelBuffer) -> Self {
        Self { buffer }
    }

    pub fn handle(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub(crate) fn handle_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    /// Give up the buffer without freeing it.
    pub fn release(self) -> PixelBuffer {
        self.buffer
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn color_mode(&self) -> ColorMode {
        self.buffer.color_mode()
    }

    pub fn is_true_color(&self) -> bool {
        self.color_mode() == ColorMode::TrueColor
    }

    // ------------------------------------------------------------------
    // Colors
    // ------------------------------------------------------------------

    pub fn allocate_color(&mut self, rgba: Rgba<u8>) -> Result<Color> {
        self.buffer.allocate(rgba)
    }

    pub fn allocate_color_or_closest(&mut self, rgba: Rgba<u8>) -> Color {
        self.buffer.resolve(rgba)
    }

    pub fn exact_color(&self, rgba: Rgba<u8>) -> Option<Color> {
        self.buffer.exact(rgba)
    }

    pub fn closest_color(&self, rgba: Rgba<u8>) -> Color {
        self.buffer.closest(rgba)
    }

    pub fn color_rgba(&self, color: Color) -> Rgba<u8> {
        self.buffer.rgba_of(color)
    }

    pub fn color_at(&self, x: u32, y: u32) -> Color {
        self.buffer.get(x, y)
    }

    pub fn set_color_at(&mut self, x: u32, y: u32, color: Color) {
        self.buffer.set(x, y, color);
    }

    pub fn rgba_at(&self, x: u32, y: u32) -> Rgba<u8> {
        self.buffer.get_rgba(x, y)
    }

    pub fn set_rgba_at(&mut self, x: u32, y: u32, rgba: Rgba<u8>) {
        let color = self.buffer.resolve(rgba);
        self.buffer.set(x, y, color);
    }

    // ------------------------------------------------------------------
    // Transparency
    // ------------------------------------------------------------------

    pub fn is_transparent(&self) -> bool {
        self.buffer.transparent().is_some()
    }

    pub fn transparent_color(&self) -> Option<Color> {
        self.buffer.transparent()
    }

    pub fn transparent_rgba(&self) -> Option<Rgba<u8>> {
        self.buffer.transparent().map(|c| self.buffer.rgba_of(c))
    }

    pub fn set_transparent_color(&mut self, color: Option<Color>) {
        self.buffer.set_transparent(color);
    }

    /// Returns the previous setting.
    pub fn alpha_blending(&mut self, on: bool) -> bool {
        self.buffer.set_alpha_blending(on)
    }

    /// Returns the previous setting.
    pub fn save_alpha(&mut self, on: bool) -> bool {
        self.buffer.set_save_alpha(on)
    }

    /// Adopt `source`'s transparent color as this image's key, optionally
    /// flood-filling it from the top-left corner.
    pub fn copy_transparency_from(&mut self, source: &Image, fill: bool) -> Result<()> {
        let Some(rgba) = source.transparent_rgba() else {
            return Ok(());
        };
        let key = self.allocate_color(rgba)?;
        self.set_transparent_color(Some(key));
        if fill {
            blit::flood_fill(&mut self.buffer, 0, 0, key);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversions and copies
    // ------------------------------------------------------------------

    pub fn as_true_color(&self) -> Image {
        Self::wrap(self.buffer.to_true_color())
    }

    /// Palette copy. `dither` defaults to dithering transparent images.
    pub fn as_palette(&self, max_colors: usize, dither: Option<bool>, match_palette: bool) -> Image {
        let dither = dither.unwrap_or_else(|| self.is_transparent());
        debug!(max_colors, dither, match_palette, "quantising to palette");
        Self::wrap(self.buffer.to_indexed(max_colors, dither, match_palette))
    }

    /// Blit the whole image onto `dest` at `(left, top)`.
    pub fn copy_to(&self, dest: &mut Image, left: i64, top: i64) {
        blit::copy(
            &self.buffer,
            &mut dest.buffer,
            left,
            top,
            Rect::whole(&self.buffer),
        );
    }

    pub fn copy(&self) -> Image {
        self.clone()
    }

    /// Copy with every pixel opaque. Palette images are copied as-is.
    pub fn copy_no_alpha(&self) -> Image {
        let mut out = self.clone();
        if let Pixels::TrueColor(img) = out.buffer.pixels_mut() {
            for px in img.pixels_mut() {
                px.0[3] = 255;
            }
            out.buffer.set_transparent(None);
        }
        out
    }

    /// Flood fill the region around `(x, y)`.
    pub fn fill(&mut self, x: u32, y: u32, color: Color) {
        blit::flood_fill(&mut self.buffer, x, y, color);
    }

    /// Inverted colors. Palette images stay palette images and their key
    /// follows the inverted entry.
    pub fn as_negative(&self) -> Result<Image> {
        match self.buffer.pixels() {
            Pixels::Indexed { palette, indices } => {
                let inverted = palette
                    .entries()
                    .iter()
                    .map(|e| Rgba([255 - e.0[0], 255 - e.0[1], 255 - e.0[2], e.0[3]]))
                    .collect();
                let pixels = Pixels::Indexed {
                    palette: Palette::from_entries(inverted)?,
                    indices: indices.clone(),
                };
                Ok(Self::wrap(self.buffer.with_pixels(pixels)))
            }
            Pixels::TrueColor(img) => {
                let negated = Filter::Negate.apply(img)?;
                let mut out = self.buffer.with_pixels(Pixels::TrueColor(negated));
                if let Some(key) = self.buffer.transparent() {
                    let k = key.to_rgba();
                    out.set_transparent(Some(Color::from_rgba(Rgba([
                        255 - k.0[0],
                        255 - k.0[1],
                        255 - k.0[2],
                        k.0[3],
                    ]))));
                }
                Ok(Self::wrap(out))
            }
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Run any registered operation, built-in or not.
    pub fn apply(&self, ops: &OperationRegistry, name: &str, args: &Args<'_>) -> Result<Image> {
        ops.apply(name, self, args)
    }

    pub fn merge(
        &self,
        ops: &OperationRegistry,
        overlay: &Image,
        left: impl Into<Coordinate>,
        top: impl Into<Coordinate>,
        pct: i64,
    ) -> Result<Image> {
        let args = Args::new()
            .with(overlay)
            .with(left.into())
            .with(top.into())
            .with(pct);
        ops.apply("merge", self, &args)
    }

    pub fn resize(
        &self,
        ops: &OperationRegistry,
        width: Option<Coordinate>,
        height: Option<Coordinate>,
        fit: Fit,
        scale: Scale,
    ) -> Result<Image> {
        let args = Args::new()
            .with(width)
            .with(height)
            .with(fit.as_str())
            .with(scale.as_str());
        ops.apply("resize", self, &args)
    }

    /// Resize that never enlarges.
    pub fn resize_down(
        &self,
        ops: &OperationRegistry,
        width: Option<Coordinate>,
        height: Option<Coordinate>,
        fit: Fit,
    ) -> Result<Image> {
        self.resize(ops, width, height, fit, Scale::Down)
    }

    /// Resize that never shrinks.
    pub fn resize_up(
        &self,
        ops: &OperationRegistry,
        width: Option<Coordinate>,
        height: Option<Coordinate>,
        fit: Fit,
    ) -> Result<Image> {
        self.resize(ops, width, height, fit, Scale::Up)
    }

    pub fn crop(
        &self,
        ops: &OperationRegistry,
        left: impl Into<Coordinate>,
        top: impl Into<Coordinate>,
        width: impl Into<Coordinate>,
        height: impl Into<Coordinate>,
    ) -> Result<Image> {
        let args = Args::new()
            .with(left.into())
            .with(top.into())
            .with(width.into())
            .with(height.into());
        ops.apply("crop", self, &args)
    }

    pub fn auto_crop(
        &self,
        ops: &OperationRegistry,
        margin: i64,
        rgb_threshold: i64,
        pixel_cutoff: i64,
        base_color: Option<Rgba<u8>>,
    ) -> Result<Image> {
        let args = Args::new()
            .with(margin)
            .with(rgb_threshold)
            .with(pixel_cutoff)
            .with(base_color);
        ops.apply("autocrop", self, &args)
    }

    /// Rotate clockwise by `angle` degrees.
    pub fn rotate(
        &self,
        ops: &OperationRegistry,
        angle: f64,
        bg_color: Option<Rgba<u8>>,
        ignore_transparent: bool,
    ) -> Result<Image> {
        let args = Args::new()
            .with(angle)
            .with(bg_color)
            .with(ignore_transparent);
        ops.apply("rotate", self, &args)
    }

    pub fn apply_mask(
        &self,
        ops: &OperationRegistry,
        mask: &Image,
        left: impl Into<Coordinate>,
        top: impl Into<Coordinate>,
    ) -> Result<Image> {
        let args = Args::new().with(mask).with(left.into()).with(top.into());
        ops.apply("apply_mask", self, &args)
    }

    /// Grayscale image of the alpha channel.
    pub fn mask(&self, ops: &OperationRegistry) -> Result<Image> {
        ops.apply("get_mask", self, &Args::new())
    }

    pub fn apply_filter(&self, ops: &OperationRegistry, filter: &str, args: &[f64]) -> Result<Image> {
        let args = args
            .iter()
            .fold(Args::new().with(filter), |acc, v| acc.with(*v));
        ops.apply("apply_filter", self, &args)
    }

    pub fn apply_convolution(
        &self,
        ops: &OperationRegistry,
        matrix: [[f32; 3]; 3],
        divisor: f32,
        offset: f32,
    ) -> Result<Image> {
        let args = Args::new()
            .with(matrix.concat())
            .with(divisor)
            .with(offset);
        ops.apply("apply_convolution", self, &args)
    }

    pub fn as_grayscale(&self, ops: &OperationRegistry) -> Result<Image> {
        ops.apply("as_grayscale", self, &Args::new())
    }

    /// Left-right mirror.
    pub fn mirror(&self, ops: &OperationRegistry) -> Result<Image> {
        ops.apply("mirror", self, &Args::new())
    }

    /// Upside-down flip.
    pub fn flip(&self, ops: &OperationRegistry) -> Result<Image> {
        ops.apply("flip", self, &Args::new())
    }

    pub fn unsharp(
        &self,
        ops: &OperationRegistry,
        amount: f64,
        radius: f64,
        threshold: f64,
    ) -> Result<Image> {
        let args = Args::new().with(amount).with(radius).with(threshold);
        ops.apply("unsharp", self, &args)
    }

    pub fn correct_gamma(&self, ops: &OperationRegistry, input: f64, output: f64) -> Result<Image> {
        let args = Args::new().with(input).with(output);
        ops.apply("correct_gamma", self, &args)
    }

    /// Keep only the named channels (`red`, `green`, `blue`, `alpha`).
    pub fn channels(&self, ops: &OperationRegistry, names: &[&str]) -> Result<Image> {
        let args = names.iter().fold(Args::new(), |acc, n| acc.with(*n));
        ops.apply("copy_channels", self, &args)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Encode in the named format.
    pub fn as_bytes(
        &self,
        mappers: &MapperRegistry,
        format: &str,
        options: &SaveOptions,
    ) -> Result<Vec<u8>> {
        mappers.select(None, Some(format))?.encode(&self.buffer, options)
    }

    /// Encode and write to `path`; the format comes from `format` or the
    /// path's extension.
    pub fn save_to_file(
        &self,
        mappers: &MapperRegistry,
        path: impl AsRef<Path>,
        format: Option<&str>,
        options: &SaveOptions,
    ) -> Result<()> {
        let path = path.as_ref();
        let uri = path.to_string_lossy();
        let mapper = mappers.select(Some(&*uri), format)?;
        debug!(path = %path.display(), mapper = mapper.name(), "saving image");
        mapper.save(&self.buffer, Some(path), options)?;
        Ok(())
    }

    /// Encode, then emit `Content-Length` and `Content-Type` followed by the
    /// body. Nothing is emitted when encoding fails.
    pub fn output(
        &self,
        mappers: &MapperRegistry,
        sink: &mut dyn ResponseSink,
        format: &str,
        options: &SaveOptions,
    ) -> Result<()> {
        let mapper = mappers.select(None, Some(format))?;
        let bytes = mapper.encode(&self.buffer, options)?;
        sink.header("Content-Length", &bytes.len().to_string());
        sink.header("Content-Type", mapper.mime_type());
        sink.body(&bytes)?;
        Ok(())
    }

    /// GIF when the image has a transparent color, PNG otherwise.
    pub fn to_default_bytes(&self, mappers: &MapperRegistry) -> Result<Vec<u8>> {
        let format = if self.is_transparent() { "gif" } else { "png" };
        self.as_bytes(mappers, format, &SaveOptions::default())
    }

    pub fn canvas(&mut self) -> Canvas<'_> {
        Canvas::new(self)
    }
}

impl TryFrom<PixelBuffer> for Image {
    type Error = Error;

    fn try_from(buffer: PixelBuffer) -> Result<Self> {
        Self::from_handle(buffer)
    }
}
