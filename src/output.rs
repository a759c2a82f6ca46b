//! CLI output formatting.
//!
//! Each command has a `format_*` function returning `Vec<String>` and a
//! `print_*` wrapper that writes to stdout. Format functions are pure: no
//! I/O, no side effects.
//!
//! # Output Format
//!
//! ## Info
//!
//! ```text
//! 001 photo.png
//!     Format: png (image/png)
//!     Size: 640x480
//!     Mode: indexed, 17 colors
//!     Transparent: #ff00ff
//! ```
//!
//! ## Batch
//!
//! ```text
//! Processing 3 images
//!     001 a.png → out/a.bmp (320x200)
//!     003 missing.png
//!         Failed: Source image not found: missing.png
//! 2 written, 1 failed
//! ```

use crate::batch::{BatchEvent, BatchSummary};
use crate::image::Image;
use crate::raster::{ColorMode, Pixels};
use image::Rgba;
use serde::Serialize;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `#rrggbb`, or `#rrggbbaa` when not fully opaque.
pub fn hex_color(rgba: Rgba<u8>) -> String {
    let [r, g, b, a] = rgba.0;
    if a == 255 {
        format!("#{r:02x}{g:02x}{b:02x}")
    } else {
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

// ============================================================================
// Info
// ============================================================================

/// What `widepix info` reports about one image. Also the JSON shape of
/// `info --json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub path: String,
    pub format: Option<String>,
    pub mime_type: Option<String>,
    pub width: u32,
    pub height: u32,
    pub true_color: bool,
    pub palette_size: Option<usize>,
    pub transparent: Option<String>,
}

impl ImageInfo {
    pub fn describe(path: &Path, format: Option<&str>, mime_type: Option<&str>, image: &Image) -> Self {
        let palette_size = match image.handle().pixels() {
            Pixels::Indexed { palette, .. } => Some(palette.len()),
            Pixels::TrueColor(_) => None,
        };
        Self {
            path: path.display().to_string(),
            format: format.map(str::to_string),
            mime_type: mime_type.map(str::to_string),
            width: image.width(),
            height: image.height(),
            true_color: image.color_mode() == ColorMode::TrueColor,
            palette_size,
            transparent: image.transparent_rgba().map(hex_color),
        }
    }
}

pub fn format_info(index: usize, info: &ImageInfo) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {}",
        format_index(index),
        file_name(Path::new(&info.path))
    )];
    let format = match (&info.format, &info.mime_type) {
        (Some(f), Some(m)) => format!("{f} ({m})"),
        (Some(f), None) => f.clone(),
        _ => "unknown".to_string(),
    };
    lines.push(format!("{}Format: {}", indent(1), format));
    lines.push(format!("{}Size: {}x{}", indent(1), info.width, info.height));
    let mode = match info.palette_size {
        Some(n) => format!("indexed, {n} colors"),
        None => "true color".to_string(),
    };
    lines.push(format!("{}Mode: {}", indent(1), mode));
    if let Some(key) = &info.transparent {
        lines.push(format!("{}Transparent: {}", indent(1), key));
    }
    lines
}

pub fn print_info(index: usize, info: &ImageInfo) {
    for line in format_info(index, info) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { total } => {
            let noun = if *total == 1 { "image" } else { "images" };
            vec![format!("Processing {} {}", total, noun)]
        }
        BatchEvent::Processed {
            index,
            source,
            output,
            dimensions: (w, h),
        } => vec![format!(
            "{}{} {} → {} ({}x{})",
            indent(1),
            format_index(*index),
            file_name(source),
            output.display(),
            w,
            h
        )],
        BatchEvent::Failed {
            index,
            source,
            error,
        } => vec![
            format!("{}{} {}", indent(1), format_index(*index), file_name(source)),
            format!("{}Failed: {}", indent(2), error),
        ],
    }
}

pub fn format_batch_summary(summary: &BatchSummary) -> Vec<String> {
    vec![summary.to_string()]
}

pub fn print_batch_summary(summary: &BatchSummary) {
    for line in format_batch_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use std::path::PathBuf;

    #[test]
    fn format_index_pads_to_three() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn hex_color_drops_opaque_alpha() {
        assert_eq!(hex_color(RED), "#ff0000");
        assert_eq!(hex_color(Rgba([1, 2, 3, 127])), "#0102037f");
    }

    #[test]
    fn info_for_true_color() {
        let img = solid(64, 32, RED);
        let info = ImageInfo::describe(Path::new("dir/photo.png"), Some("png"), Some("image/png"), &img);
        assert_eq!(
            format_info(1, &info),
            vec![
                "001 photo.png",
                "    Format: png (image/png)",
                "    Size: 64x32",
                "    Mode: true color",
            ]
        );
    }

    #[test]
    fn info_for_keyed_palette() {
        let img = keyed_palette(4, 4);
        let info = ImageInfo::describe(Path::new("k.gif"), None, None, &img);
        let lines = format_info(2, &info);
        assert_eq!(lines[1], "    Format: unknown");
        assert!(lines[3].starts_with("    Mode: indexed, "));
        assert!(lines[4].starts_with("    Transparent: #"));
    }

    #[test]
    fn info_serializes_to_json() {
        let info = ImageInfo::describe(Path::new("a.png"), Some("png"), None, &solid(2, 3, BLUE));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["width"], 2);
        assert_eq!(json["height"], 3);
        assert_eq!(json["true_color"], true);
        assert!(json["transparent"].is_null());
    }

    #[test]
    fn batch_started_pluralizes() {
        assert_eq!(
            format_batch_event(&BatchEvent::Started { total: 1 }),
            vec!["Processing 1 image"]
        );
        assert_eq!(
            format_batch_event(&BatchEvent::Started { total: 3 }),
            vec!["Processing 3 images"]
        );
    }

    #[test]
    fn batch_processed_line() {
        let event = BatchEvent::Processed {
            index: 1,
            source: PathBuf::from("in/a.png"),
            output: PathBuf::from("out/a.bmp"),
            dimensions: (320, 200),
        };
        assert_eq!(
            format_batch_event(&event),
            vec!["    001 a.png → out/a.bmp (320x200)"]
        );
    }

    #[test]
    fn batch_failure_shows_error_indented() {
        let event = BatchEvent::Failed {
            index: 3,
            source: PathBuf::from("missing.png"),
            error: "boom".into(),
        };
        assert_eq!(
            format_batch_event(&event),
            vec!["    003 missing.png", "        Failed: boom"]
        );
    }

    #[test]
    fn summary_line() {
        let summary = BatchSummary {
            written: vec![PathBuf::from("a")],
            failed: Vec::new(),
        };
        assert_eq!(format_batch_summary(&summary), vec!["1 written, 0 failed"]);
    }
}
