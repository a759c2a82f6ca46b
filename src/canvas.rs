//! Drawing on an image in place.
//!
//! A [`Canvas`] mutably borrows one [`Image`] for as long as it lives.
//! Shapes are rasterised by `imageproc` through an adapter that turns each
//! RGBA color into a handle the image can hold: true-color images take it
//! as-is (blending when alpha blending is on), palette images allocate it or
//! fall back to the closest entry.
//!
//! Text goes through a [`FontBackend`]; the crate ships none.

use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::raster::blit;
use crate::raster::{Color, ColorMode, PixelBuffer};
use image::{GrayImage, Rgba};
use imageproc::drawing;
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::sync::Arc;
use tracing::debug;

/// Renders text to a coverage mask.
pub trait FontBackend: Send + Sync {
    /// Size of the box `rasterize` will produce for `text` at `angle` degrees.
    fn measure(&self, text: &str, angle: f64) -> (u32, u32);

    /// Coverage mask: 0 is background, 255 is fully inked.
    fn rasterize(&self, text: &str, angle: f64) -> Result<GrayImage>;
}

/// A backend plus the color text is drawn in.
#[derive(Clone)]
pub struct Font {
    backend: Arc<dyn FontBackend>,
    color: Rgba<u8>,
}

impl Font {
    pub fn new(backend: Arc<dyn FontBackend>, color: Rgba<u8>) -> Self {
        Self { backend, color }
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }
}

impl std::fmt::Debug for Font {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Font").field("color", &self.color).finish_non_exhaustive()
    }
}

/// `imageproc` view of a pixel buffer.
struct Surface<'b>(&'b mut PixelBuffer);

impl Surface<'_> {
    fn handle(&mut self, rgba: Rgba<u8>) -> Color {
        match self.0.color_mode() {
            ColorMode::TrueColor => Color::from_rgba(rgba),
            ColorMode::Indexed => self.0.resolve(rgba),
        }
    }
}

impl drawing::Canvas for Surface<'_> {
    type Pixel = Rgba<u8>;

    fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    fn get_pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        self.0.get_rgba(x, y)
    }

    fn draw_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        let handle = self.handle(color);
        self.0.set(x, y, handle);
    }
}

pub struct Canvas<'a> {
    image: &'a mut Image,
    font: Option<Font>,
}

impl<'a> Canvas<'a> {
    pub fn new(image: &'a mut Image) -> Self {
        Self { image, font: None }
    }

    fn surface(&mut self) -> Surface<'_> {
        Surface(self.image.handle_mut())
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        let (w, h) = self.image.dimensions();
        if x < w && y < h {
            drawing::Canvas::draw_pixel(&mut self.surface(), x, y, color);
        }
    }

    pub fn line(&mut self, from: (i32, i32), to: (i32, i32), color: Rgba<u8>) {
        let start = (from.0 as f32, from.1 as f32);
        let end = (to.0 as f32, to.1 as f32);
        drawing::draw_line_segment_mut(&mut self.surface(), start, end, color);
    }

    /// Outline of the `width` x `height` box at `(x, y)`. Empty boxes draw nothing.
    pub fn rectangle(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        if width > 0 && height > 0 {
            let rect = Rect::at(x, y).of_size(width, height);
            drawing::draw_hollow_rect_mut(&mut self.surface(), rect, color);
        }
    }

    pub fn filled_rectangle(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        if width > 0 && height > 0 {
            let rect = Rect::at(x, y).of_size(width, height);
            drawing::draw_filled_rect_mut(&mut self.surface(), rect, color);
        }
    }

    /// Ellipse with the given full `width` and `height` centred on `center`.
    pub fn ellipse(&mut self, center: (i32, i32), width: u32, height: u32, color: Rgba<u8>) {
        let (rx, ry) = radii(width, height);
        drawing::draw_hollow_ellipse_mut(&mut self.surface(), center, rx, ry, color);
    }

    pub fn filled_ellipse(&mut self, center: (i32, i32), width: u32, height: u32, color: Rgba<u8>) {
        let (rx, ry) = radii(width, height);
        drawing::draw_filled_ellipse_mut(&mut self.surface(), center, rx, ry, color);
    }

    pub fn circle(&mut self, center: (i32, i32), radius: u32, color: Rgba<u8>) {
        drawing::draw_hollow_circle_mut(&mut self.surface(), center, clamp_i32(radius), color);
    }

    pub fn filled_circle(&mut self, center: (i32, i32), radius: u32, color: Rgba<u8>) {
        drawing::draw_filled_circle_mut(&mut self.surface(), center, clamp_i32(radius), color);
    }

    /// Closed outline through `points`.
    pub fn polygon(&mut self, points: &[(i32, i32)], color: Rgba<u8>) -> Result<()> {
        let points = polygon_points(points)?;
        let outline: Vec<Point<f32>> = points.iter().map(|p| Point::new(p.x as f32, p.y as f32)).collect();
        drawing::draw_hollow_polygon_mut(&mut self.surface(), &outline, color);
        Ok(())
    }

    pub fn filled_polygon(&mut self, points: &[(i32, i32)], color: Rgba<u8>) -> Result<()> {
        let points = polygon_points(points)?;
        drawing::draw_polygon_mut(&mut self.surface(), &points, color);
        Ok(())
    }

    /// Flood fill the region of identical pixels around `(x, y)`.
    pub fn fill(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        let handle = self.surface().handle(color);
        blit::flood_fill(self.image.handle_mut(), x, y, handle);
    }

    /// Fill outward from `(x, y)` up to pixels of the `border` color.
    pub fn fill_to_border(&mut self, x: u32, y: u32, border: Rgba<u8>, color: Rgba<u8>) {
        let border = self.image.closest_color(border);
        let handle = self.surface().handle(color);
        blit::fill_to_border(self.image.handle_mut(), x, y, border, handle);
    }

    pub fn set_font(&mut self, font: Font) {
        self.font = Some(font);
    }

    pub fn font(&self) -> Option<&Font> {
        self.font.as_ref()
    }

    /// Draw `text` with its box placed at `(x, y)`. Coordinates resolve with
    /// the measured text box as the element, so `"c"` centres the text.
    pub fn write_text(
        &mut self,
        x: impl Into<Coordinate>,
        y: impl Into<Coordinate>,
        text: &str,
        angle: f64,
    ) -> Result<()> {
        let Some(font) = self.font.clone() else {
            return Err(Error::invalid_argument("write_text", "no font set on the canvas"));
        };
        let (bw, bh) = font.backend.measure(text, angle);
        let (w, h) = self.image.dimensions();
        let left = x.into().resolve_within(w, bw)?;
        let top = y.into().resolve_within(h, bh)?;
        let mask = font.backend.rasterize(text, angle)?;
        debug!(left, top, width = mask.width(), height = mask.height(), "writing text");

        let buffer = self.image.handle_mut();
        let indexed = buffer.color_mode() == ColorMode::Indexed;
        let ink = if indexed { Some(buffer.resolve(font.color)) } else { None };
        for (mx, my, coverage) in mask.enumerate_pixels() {
            let coverage = coverage.0[0];
            let px = left.saturating_add(mx as i64);
            let py = top.saturating_add(my as i64);
            if coverage == 0 || px < 0 || py < 0 || px >= w as i64 || py >= h as i64 {
                continue;
            }
            let (px, py) = (px as u32, py as u32);
            match ink {
                Some(handle) if coverage >= 128 => buffer.put(px, py, handle),
                Some(_) => {}
                None => {
                    let mut src = font.color;
                    src.0[3] = (u32::from(src.0[3]) * u32::from(coverage) / 255) as u8;
                    let out = blit::over(buffer.get_rgba(px, py), src);
                    buffer.put(px, py, Color::from_rgba(out));
                }
            }
        }
        Ok(())
    }
}

fn clamp_i32(v: u32) -> i32 {
    v.min(i32::MAX as u32) as i32
}

fn radii(width: u32, height: u32) -> (i32, i32) {
    (clamp_i32(width / 2), clamp_i32(height / 2))
}

/// At least three points, without a repeated closing point.
fn polygon_points(points: &[(i32, i32)]) -> Result<Vec<Point<i32>>> {
    let mut pts: Vec<Point<i32>> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    if pts.len() < 3 {
        return Err(Error::invalid_argument(
            "polygon",
            format!("needs at least 3 distinct points, got {}", pts.len()),
        ));
    }
    Ok(pts)
}
