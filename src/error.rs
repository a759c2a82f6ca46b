//! Error kinds shared by every layer of the crate.
//!
//! All failures are returned to the immediate caller. Nothing here falls back
//! to a default image or a default format: recovering (e.g. retrying with a
//! different format hint) is the caller's call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A buffer that is not a usable pixel handle was passed where one is required.
    #[error("Invalid image handle: {0}")]
    InvalidImageHandle(String),
    /// A load source is neither a handle, decodable data, nor a readable file.
    #[error("Invalid image source: {0}")]
    InvalidImageSource(String),
    #[error("Invalid image dimension: {0}")]
    InvalidImageDimension(String),
    /// No operation is registered under this name.
    #[error("Unknown operation: '{0}'")]
    UnknownOperation(String),
    /// No mapper matches the format, MIME type or extension.
    #[error("Unknown format: '{0}'")]
    UnknownFormat(String),
    #[error("Invalid coordinate: '{0}'")]
    InvalidCoordinate(String),
    #[error("Palette exhausted: all {0} entries are allocated")]
    PaletteExhausted(usize),
    #[error("Invalid argument for '{operation}': {message}")]
    InvalidArgument { operation: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] image::ImageError),
}

impl Error {
    pub fn invalid_argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn dimension(msg: impl Into<String>) -> Self {
        Self::InvalidImageDimension(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::InvalidImageSource(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_operation_names_the_operation() {
        let err = Error::UnknownOperation("Sharpen".into());
        assert_eq!(err.to_string(), "Unknown operation: 'Sharpen'");
    }

    #[test]
    fn invalid_argument_names_operation_and_reason() {
        let err = Error::invalid_argument("crop", "width must be a coordinate");
        assert!(err.to_string().contains("'crop'"));
        assert!(err.to_string().contains("width must be a coordinate"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
