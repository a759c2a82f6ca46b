//! # widepix
//!
//! An image object over raw pixel buffers, with pluggable operations and
//! pluggable file formats. Load from a path, bytes, an upload or an existing
//! buffer, chain operations, save in any registered format.
//!
//! ```no_run
//! use widepix::Context;
//!
//! let ctx = Context::new();
//! let photo = ctx.load("photo.jpg", None)?;
//! let logo = ctx.load("logo.png", None)?;
//! let out = photo
//!     .resize(ctx.operations(), Some("50%".into()), None, Default::default(), Default::default())?
//!     .merge(ctx.operations(), &logo, "right-10", "bottom-10", 70)?;
//! out.save_to_file(ctx.mappers(), "out.webp", None, &Default::default())?;
//! # Ok::<(), widepix::Error>(())
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`raster`] | Pixel buffers: true color or palette, transparent key, blending flags |
//! | [`image`] | The [`Image`] value: colors, pixels, conversions, export |
//! | [`coordinate`] | Smart coordinates: `50%`, `center`, `right-10`, `50%+5` |
//! | [`operation`] | The [`Operation`](operation::Operation) trait, argument model and registry, plus every built-in |
//! | [`mapper`] | Format mappers (PNG, JPEG, GIF, BMP, TIFF, WebP) and their registry |
//! | [`source`] | Load sources, binary sniffing, pending uploads, source readers |
//! | [`context`] | Owns the registries; the entry point for loading |
//! | [`canvas`] | Drawing primitives and text on an image |
//! | [`batch`] | Step pipelines over files, in parallel |
//! | [`config`] | `widepix.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Images Are Values
//!
//! Every operation returns a new [`Image`] and leaves its input untouched.
//! The handful of in-place edits (pixels, transparency, drawing) take
//! `&mut self`, so sharing an image across threads needs no locking.
//!
//! ## Registries Over Hard-Wired Dispatch
//!
//! Operations and format mappers are looked up by name in registries owned
//! by a [`Context`]. Built-ins are registered the same way an application
//! registers its own, and a later registration under the same name wins.
//! Operation instances are created on first use and cached.
//!
//! ## Pure-Rust Codecs
//!
//! Decoding and encoding go through the `image` crate with pure-Rust
//! codecs only. No system libraries, no version conflicts.

pub mod batch;
pub mod canvas;
pub mod config;
pub mod context;
pub mod coordinate;
pub mod error;
pub mod image;
pub mod mapper;
pub mod operation;
pub mod output;
pub mod raster;
pub mod source;

pub use context::Context;
pub use coordinate::Coordinate;
pub use error::{Error, Result};
pub use image::Image;

#[cfg(test)]
pub(crate) mod test_helpers;
