//! `merge`: composite an overlay onto a true-color copy of the base.

use super::{Args, Operation};
use crate::coordinate::Coordinate;
use crate::error::Result;
use crate::image::Image;
use crate::raster::blit::{self, Rect};
use tracing::debug;

pub struct Merge;

impl Operation for Merge {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image> {
        let r = args.reader("merge");
        let overlay = r.image(0)?;
        let left = r.coord_or(1, 0)?;
        let top = r.coord_or(2, 0)?;
        let pct = r.int_or(3, 100)?;
        merge(image, overlay, &left, &top, pct)
    }
}

/// Composite `overlay` at `(left, top)` with `pct` percent opacity.
///
/// Coordinates are resolved against the base size with the overlay as the
/// element, so `"c"` centres it. At 100 % or more the overlay is blitted
/// as-is (keyed pixels skipped, translucent ones blended); between 0 and
/// 100 every non-key overlay pixel is mixed opaque into the base.
pub fn merge(
    base: &Image,
    overlay: &Image,
    left: &Coordinate,
    top: &Coordinate,
    pct: i64,
) -> Result<Image> {
    let (ow, oh) = overlay.dimensions();
    let x = left.resolve_within(base.width(), ow)?;
    let y = top.resolve_within(base.height(), oh)?;
    debug!(x, y, pct, "merge");

    let mut result = base.as_true_color();
    result.alpha_blending(true);
    result.save_alpha(true);
    if pct <= 0 {
        return Ok(result);
    }

    let src = overlay.handle();
    let rect = Rect::whole(src);
    if pct < 100 {
        blit::copy_merge(src, result.handle_mut(), x, y, rect, pct as u32);
    } else {
        blit::copy(src, result.handle_mut(), x, y, rect);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::ColorMode;
    use crate::test_helpers::*;
    use image::Rgba;

    #[test]
    fn centred_full_opacity_overlay() {
        let base = gradient(100, 100);
        let before = base.rgba_at(10, 10);
        let overlay = solid(50, 50, RED);
        let out = merge(&base, &overlay, &"c".into(), &"c".into(), 100).unwrap();
        assert_eq!(out.rgba_at(50, 50), RED);
        assert_eq!(out.rgba_at(10, 10), before);
        assert_region(&out, (25, 25, 50, 50), RED);
        // base is untouched
        assert_eq!(base.rgba_at(50, 50), gradient(100, 100).rgba_at(50, 50));
    }

    #[test]
    fn zero_pct_is_a_true_color_copy() {
        let base = keyed_palette(6, 6);
        let out = merge(&base, &solid(2, 2, RED), &0.into(), &0.into(), 0).unwrap();
        let expected = base.as_true_color();
        assert_eq!(out.handle().to_rgba_image(), expected.handle().to_rgba_image());
        assert_eq!(out.transparent_color(), expected.transparent_color());
        assert_eq!(out.color_mode(), ColorMode::TrueColor);
        assert!(out.handle().alpha_blending());
    }

    #[test]
    fn partial_pct_mixes_and_truncates() {
        let base = solid(4, 4, Rgba([0, 0, 100, 255]));
        let overlay = solid(2, 2, Rgba([255, 0, 0, 255]));
        let out = merge(&base, &overlay, &0.into(), &0.into(), 50).unwrap();
        // 255 * 50 / 100 = 127, 100 * 50 / 100 = 50
        assert_eq!(out.rgba_at(0, 0), Rgba([127, 0, 50, 255]));
        assert_eq!(out.rgba_at(3, 3), Rgba([0, 0, 100, 255]));
    }

    #[test]
    fn overlay_key_is_skipped() {
        let base = solid(4, 1, BLUE);
        let overlay = keyed_palette(4, 1);
        let out = merge(&base, &overlay, &0.into(), &0.into(), 100).unwrap();
        assert_eq!(out.rgba_at(0, 0), WHITE);
        assert_eq!(out.rgba_at(3, 0), BLUE);
    }

    #[test]
    fn overlay_is_clipped_at_the_edges() {
        let base = solid(4, 4, BLUE);
        let out = merge(&base, &solid(4, 4, RED), &"-1".into(), &"-1".into(), 100).unwrap();
        assert_eq!(out.rgba_at(3, 3), RED);
        assert_eq!(out.rgba_at(2, 2), BLUE);
        assert_eq!(out.dimensions(), (4, 4));
    }
}
