//! Built-in mappers over the `image` crate's codecs.
//!
//! | Mapper | Aliases | Decode | Encode |
//! |---|---|---|---|
//! | `bmp` | | true color | RGBA |
//! | `gif` | | indexed, alpha 0 becomes the key | RGBA, quantised by the encoder |
//! | `jpeg` | `jpg`, `jpe`, `jfif`, `pjpeg` | true color | RGB at [`Quality`](super::Quality) |
//! | `png` | | true color | RGBA, compression 0-9 |
//! | `tiff` | `tif` | true color | RGBA |
//! | `webp` | | true color | lossless RGBA |

use super::{FormatMapper, SaveOptions};
use crate::error::Result;
use crate::raster::{MAX_PALETTE_SIZE, PixelBuffer};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;

/// A mapper backed by one `image` codec.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    name: &'static str,
    aliases: &'static [&'static str],
    mime_type: &'static str,
    format: ImageFormat,
}

const BUILTINS: &[Codec] = &[
    Codec {
        name: "bmp",
        aliases: &[],
        mime_type: "image/bmp",
        format: ImageFormat::Bmp,
    },
    Codec {
        name: "gif",
        aliases: &[],
        mime_type: "image/gif",
        format: ImageFormat::Gif,
    },
    Codec {
        name: "jpeg",
        aliases: &["jpg", "jpe", "jfif", "pjpeg"],
        mime_type: "image/jpeg",
        format: ImageFormat::Jpeg,
    },
    Codec {
        name: "png",
        aliases: &[],
        mime_type: "image/png",
        format: ImageFormat::Png,
    },
    Codec {
        name: "tiff",
        aliases: &["tif"],
        mime_type: "image/tiff",
        format: ImageFormat::Tiff,
    },
    Codec {
        name: "webp",
        aliases: &[],
        mime_type: "image/webp",
        format: ImageFormat::WebP,
    },
];

/// One instance of every built-in mapper, in registration order.
pub fn builtins() -> Vec<Arc<dyn FormatMapper>> {
    BUILTINS
        .iter()
        .map(|c| Arc::new(*c) as Arc<dyn FormatMapper>)
        .collect()
}

/// Canonical mapper name for the format `bytes` start with, if any.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    BUILTINS.iter().find(|c| c.format == format).map(|c| c.name)
}

fn png_compression(level: Option<u8>) -> CompressionType {
    match level {
        None => CompressionType::Default,
        Some(0..=3) => CompressionType::Fast,
        Some(4..=6) => CompressionType::Default,
        Some(_) => CompressionType::Best,
    }
}

impl FormatMapper for Codec {
    fn name(&self) -> &str {
        self.name
    }

    fn aliases(&self) -> &[&'static str] {
        self.aliases
    }

    fn mime_type(&self) -> &str {
        self.mime_type
    }

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer> {
        let rgba = image::load_from_memory_with_format(bytes, self.format)?.to_rgba8();
        let buffer = PixelBuffer::from_rgba(rgba)?;
        if self.format == ImageFormat::Gif {
            return Ok(buffer.to_indexed(MAX_PALETTE_SIZE, false, false));
        }
        Ok(buffer)
    }

    fn encode(&self, buffer: &PixelBuffer, options: &SaveOptions) -> Result<Vec<u8>> {
        let rgba = buffer.to_export_rgba();
        let mut out = Cursor::new(Vec::new());
        match self.format {
            ImageFormat::Jpeg => {
                let quality = options.quality.unwrap_or_default().value() as u8;
                let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
                rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
            }
            ImageFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut out,
                    png_compression(options.compression),
                    PngFilter::Adaptive,
                );
                rgba.write_with_encoder(encoder)?;
            }
            ImageFormat::WebP => rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))?,
            format => rgba.write_to(&mut out, format)?,
        }
        Ok(out.into_inner())
    }
}
