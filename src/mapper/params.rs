//! Encoder settings passed to [`FormatMapper::encode`](super::FormatMapper::encode).
//!
//! Each mapper reads only the options that apply to it: JPEG honours
//! [`Quality`], PNG honours `compression`, the rest ignore both.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(q: Quality) -> Self {
        q.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// JPEG quality; `None` uses [`Quality::default`].
    pub quality: Option<Quality>,
    /// PNG compression level 0-9; `None` uses the encoder default.
    pub compression: Option<u8>,
}

impl SaveOptions {
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(Quality::new(quality));
        self
    }

    pub fn with_compression(mut self, level: u8) -> Self {
        self.compression = Some(level.min(9));
        self
    }
}
