//! Blits and fills over [`PixelBuffer`]s.

use super::{Color, ColorMode, PixelBuffer};
use image::Rgba;
use std::collections::VecDeque;

/// Straight-alpha source-over.
pub fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = u32::from(src.0[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let da = u32::from(dst.0[3]) * (255 - sa) / 255;
    let out_a = sa + da;
    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (u32::from(src.0[i]) * sa + u32::from(dst.0[i]) * da + out_a / 2) / out_a;
        out[i] = c.min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    Rgba(out)
}

/// Source rectangle of a blit: `x, y, width, height` in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn whole(buffer: &PixelBuffer) -> Self {
        Self {
            x: 0,
            y: 0,
            width: buffer.width(),
            height: buffer.height(),
        }
    }
}

/// Visit every `(src_x, src_y, dst_x, dst_y)` of `rect` placed at
/// `(left, top)` that lands inside both buffers.
fn clipped(
    src: &PixelBuffer,
    dst: &PixelBuffer,
    left: i64,
    top: i64,
    rect: Rect,
    mut visit: impl FnMut(u32, u32, u32, u32),
) {
    let (sw, sh) = src.dimensions();
    let (dw, dh) = dst.dimensions();
    let outside = left >= dw as i64
        || top >= dh as i64
        || left.saturating_add(rect.width as i64) <= 0
        || top.saturating_add(rect.height as i64) <= 0;
    if outside {
        return;
    }
    for ry in 0..rect.height {
        let sy = rect.y.saturating_add(ry);
        let dy = top + ry as i64;
        if sy >= sh || dy < 0 || dy >= dh as i64 {
            continue;
        }
        for rx in 0..rect.width {
            let sx = rect.x.saturating_add(rx);
            let dx = left + rx as i64;
            if sx >= sw || dx < 0 || dx >= dw as i64 {
                continue;
            }
            visit(sx, sy, dx as u32, dy as u32);
        }
    }
}

/// Copy `rect` of `src` to `dst` at `(left, top)`.
///
/// Source pixels equal to the source key are skipped. True-color
/// destinations blend when their alpha-blending flag is on; indexed
/// destinations get the nearest color they can hold.
pub fn copy(src: &PixelBuffer, dst: &mut PixelBuffer, left: i64, top: i64, rect: Rect) {
    let mut writes = Vec::new();
    clipped(src, dst, left, top, rect, |sx, sy, dx, dy| {
        let handle = src.get(sx, sy);
        if !src.is_key(handle) {
            writes.push((dx, dy, src.rgba_of(handle)));
        }
    });
    for (x, y, rgba) in writes {
        let color = match dst.color_mode() {
            ColorMode::TrueColor => Color::from_rgba(rgba),
            ColorMode::Indexed => dst.resolve(rgba),
        };
        dst.set(x, y, color);
    }
}

/// Blend `rect` of `src` over `dst` at `pct` percent opacity.
///
/// Per RGB channel `src * pct / 100 + dst * (100 - pct) / 100`, truncated,
/// written opaque. Key pixels of the source are skipped.
pub fn copy_merge(
    src: &PixelBuffer,
    dst: &mut PixelBuffer,
    left: i64,
    top: i64,
    rect: Rect,
    pct: u32,
) {
    let pct = pct.min(100);
    let mut writes = Vec::new();
    clipped(src, dst, left, top, rect, |sx, sy, dx, dy| {
        let handle = src.get(sx, sy);
        if src.is_key(handle) {
            return;
        }
        let s = src.rgba_of(handle);
        let d = dst.get_rgba(dx, dy);
        let mix = |i: usize| {
            (u32::from(s.0[i]) * pct / 100 + u32::from(d.0[i]) * (100 - pct) / 100).min(255) as u8
        };
        writes.push((dx, dy, Rgba([mix(0), mix(1), mix(2), 255])));
    });
    for (x, y, rgba) in writes {
        let color = match dst.color_mode() {
            ColorMode::TrueColor => Color::from_rgba(rgba),
            ColorMode::Indexed => dst.resolve(rgba),
        };
        dst.put(x, y, color);
    }
}

/// Replace the 4-connected region of pixels equal to the one at `(x, y)`.
pub fn flood_fill(buffer: &mut PixelBuffer, x: u32, y: u32, color: Color) {
    let (w, h) = buffer.dimensions();
    if x >= w || y >= h {
        return;
    }
    let target = buffer.get(x, y);
    if target == color {
        return;
    }
    fill_region(buffer, x, y, color, |c| c == target);
}

/// Fill outward from `(x, y)` until pixels of the `border` color.
pub fn fill_to_border(buffer: &mut PixelBuffer, x: u32, y: u32, border: Color, color: Color) {
    let (w, h) = buffer.dimensions();
    if x >= w || y >= h || buffer.get(x, y) == border {
        return;
    }
    fill_region(buffer, x, y, color, |c| c != border);
}

fn fill_region(
    buffer: &mut PixelBuffer,
    x: u32,
    y: u32,
    color: Color,
    inside: impl Fn(Color) -> bool,
) {
    let (w, h) = buffer.dimensions();
    let mut seen = vec![false; w as usize * h as usize];
    let mut queue = VecDeque::from([(x, y)]);
    seen[(y * w + x) as usize] = true;

    while let Some((cx, cy)) = queue.pop_front() {
        buffer.put(cx, cy, color);
        let neighbours = [
            (cx.wrapping_sub(1), cy),
            (cx + 1, cy),
            (cx, cy.wrapping_sub(1)),
            (cx, cy + 1),
        ];
        for (nx, ny) in neighbours {
            if nx >= w || ny >= h {
                continue;
            }
            let idx = (ny * w + nx) as usize;
            if !seen[idx] && inside(buffer.get(nx, ny)) {
                seen[idx] = true;
                queue.push_back((nx, ny));
            }
        }
    }
}
