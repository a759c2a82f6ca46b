//! Pure geometry for the built-in operations.
//!
//! All functions here are pure and testable without any image.

use super::resize::{Fit, Scale};

/// Target size of a resize from already resolved box sides.
///
/// A missing side is derived from the other one, keeping the source aspect
/// ratio (rounded down). `Fit::Inside` fits the source within the box,
/// `Fit::Outside` covers it, `Fit::Fill` takes the box as is. Sides may come
/// back zero or negative; callers reject those.
///
/// # Examples
/// ```
/// # use widepix::operation::calculations::fit_dimensions;
/// # use widepix::operation::resize::Fit;
/// // 400x300 inside a 100x100 box → 100x75
/// assert_eq!(fit_dimensions((400, 300), Some(100), Some(100), Fit::Inside), (100, 75));
///
/// // Only a width: height follows the aspect ratio
/// assert_eq!(fit_dimensions((400, 300), Some(200), None, Fit::Inside), (200, 150));
/// ```
pub fn fit_dimensions(
    source: (u32, u32),
    width: Option<i64>,
    height: Option<i64>,
    fit: Fit,
) -> (i64, i64) {
    let (src_w, src_h) = (source.0 as i64, source.1 as i64);
    let (width, height) = match (width, height) {
        (None, None) => return (src_w, src_h),
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => (w, ((src_h as f64 * w as f64) / src_w as f64).floor() as i64),
        (None, Some(h)) => (((src_w as f64 * h as f64) / src_h as f64).floor() as i64, h),
    };
    if width <= 0 || height <= 0 {
        return (width.min(0), height.min(0));
    }

    match fit {
        Fit::Fill => (width, height),
        Fit::Inside | Fit::Outside => {
            let rx = src_w as f64 / width as f64;
            let ry = src_h as f64 / height as f64;
            let ratio = if fit == Fit::Inside {
                rx.max(ry)
            } else {
                rx.min(ry)
            };
            (
                (src_w as f64 / ratio).round() as i64,
                (src_h as f64 / ratio).round() as i64,
            )
        }
    }
}

/// Apply the scale restriction: a result the restriction forbids falls back
/// to the source size.
pub fn restrict_scale(source: (u32, u32), target: (i64, i64), scale: Scale) -> (i64, i64) {
    let (src_w, src_h) = (source.0 as i64, source.1 as i64);
    let (w, h) = target;
    let forbidden = match scale {
        Scale::Any => false,
        Scale::Down => w >= src_w && h >= src_h,
        Scale::Up => w <= src_w && h <= src_h,
    };
    if forbidden { (src_w, src_h) } else { target }
}

/// Clip a crop rectangle to the source.
///
/// A negative `left`/`top` shrinks the rectangle and moves it to 0; a
/// rectangle running past the far edge is cut at it. Returns `None` when
/// nothing is left.
pub fn clip_crop(
    source: (u32, u32),
    left: i64,
    top: i64,
    width: i64,
    height: i64,
) -> Option<(u32, u32, u32, u32)> {
    let (x, w) = clip_span(source.0 as i64, left, width)?;
    let (y, h) = clip_span(source.1 as i64, top, height)?;
    Some((x, y, w, h))
}

fn clip_span(length: i64, mut start: i64, mut size: i64) -> Option<(u32, u32)> {
    if start < 0 {
        size = size.saturating_add(start);
        start = 0;
    }
    size = size.min(length - start);
    if size <= 0 {
        return None;
    }
    Some((u32::try_from(start).ok()?, u32::try_from(size).ok()?))
}

/// Angle folded into `[0, 360)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    if a >= 360.0 { 0.0 } else { a }
}

/// Size of the box enclosing a `width`×`height` rectangle turned by `angle`
/// degrees.
pub fn rotated_bounds(width: u32, height: u32, angle: f64) -> (u32, u32) {
    let (sin, cos) = angle.to_radians().sin_cos();
    let (w, h) = (width as f64, height as f64);
    let bw = w * cos.abs() + h * sin.abs();
    let bh = w * sin.abs() + h * cos.abs();
    // trim float noise before rounding up
    let side = |v: f64| ((v - 1e-6).ceil() as u32).max(1);
    (side(bw), side(bh))
}
