//! Format mappers: codec adapters selected by name, alias, MIME type or file
//! extension.
//!
//! A [`FormatMapper`] knows one format. The [`MapperRegistry`] holds the
//! known mappers and picks one per call; nothing about a selection is cached
//! beyond the call that made it.
//!
//! ```text
//! select(None, Some("JPG"))          → jpeg   (alias, case-insensitive)
//! select(None, Some("image/png"))    → png    (MIME type)
//! select(Some("a/b/photo.TIF"), None) → tiff  (extension)
//! select(Some("photo"), None)        → UnknownFormat
//! ```

pub mod codecs;
mod params;

pub use params::{Quality, SaveOptions};

use crate::error::{Error, Result};
use crate::raster::PixelBuffer;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Codec adapter for one image format.
pub trait FormatMapper: Send + Sync {
    /// Canonical lowercase name, e.g. `jpeg`.
    fn name(&self) -> &str;

    /// Other names and extensions this mapper answers to.
    fn aliases(&self) -> &[&'static str] {
        &[]
    }

    fn mime_type(&self) -> &str;

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer>;

    /// Encode fully into memory. Export paths call this before touching any
    /// file or header.
    fn encode(&self, buffer: &PixelBuffer, options: &SaveOptions) -> Result<Vec<u8>>;

    fn load(&self, path: &Path) -> Result<PixelBuffer> {
        let bytes = std::fs::read(path)?;
        self.decode(&bytes)
    }

    /// Without a destination the encoded bytes are returned; with one they
    /// are written there and `None` comes back.
    fn save(
        &self,
        buffer: &PixelBuffer,
        destination: Option<&Path>,
        options: &SaveOptions,
    ) -> Result<Option<Vec<u8>>> {
        let bytes = self.encode(buffer, options)?;
        match destination {
            None => Ok(Some(bytes)),
            Some(path) => {
                std::fs::write(path, &bytes)?;
                Ok(None)
            }
        }
    }

    fn answers_to(&self, key: &str) -> bool {
        self.name().eq_ignore_ascii_case(key)
            || self.mime_type().eq_ignore_ascii_case(key)
            || self.aliases().iter().any(|a| a.eq_ignore_ascii_case(key))
    }
}

/// The set of known mappers. Later registrations shadow earlier ones that
/// answer to the same key.
pub struct MapperRegistry {
    mappers: RwLock<Vec<Arc<dyn FormatMapper>>>,
}

impl MapperRegistry {
    pub fn empty() -> Self {
        Self {
            mappers: RwLock::new(Vec::new()),
        }
    }

    /// Registry holding the built-in codecs.
    pub fn with_builtins() -> Self {
        Self {
            mappers: RwLock::new(codecs::builtins()),
        }
    }

    pub fn register(&self, mapper: Arc<dyn FormatMapper>) {
        debug!(mapper = mapper.name(), "registering format mapper");
        self.mappers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mapper);
    }

    fn find(&self, key: &str) -> Option<Arc<dyn FormatMapper>> {
        let mappers = self.mappers.read().unwrap_or_else(PoisonError::into_inner);
        mappers.iter().rev().find(|m| m.answers_to(key)).cloned()
    }

    /// Pick the mapper for an explicit `format`, or else for the extension
    /// of `uri`.
    pub fn select(&self, uri: Option<&str>, format: Option<&str>) -> Result<Arc<dyn FormatMapper>> {
        let found = match (format, uri) {
            (Some(format), _) => self.by_format(format),
            (None, Some(uri)) => extension(uri).and_then(|ext| self.find(&ext)),
            (None, None) => None,
        };
        let mapper = found.ok_or_else(|| {
            Error::UnknownFormat(format.or(uri).unwrap_or_default().to_string())
        })?;
        debug!(?uri, ?format, mapper = mapper.name(), "selected mapper");
        Ok(mapper)
    }

    pub fn mime_type(&self, format: &str) -> Result<String> {
        Ok(self.select(None, Some(format))?.mime_type().to_string())
    }

    /// Names of the registered mappers, registration order.
    pub fn names(&self) -> Vec<String> {
        let mappers = self.mappers.read().unwrap_or_else(PoisonError::into_inner);
        mappers.iter().map(|m| m.name().to_string()).collect()
    }

    /// Decode `bytes`, trusting the content over the hints: the sniffed
    /// format wins, then `format`, then the extension of `uri`.
    pub fn decode(&self, bytes: &[u8], uri: Option<&str>, format: Option<&str>) -> Result<PixelBuffer> {
        let mapper = match codecs::sniff(bytes).and_then(|name| self.find(name)) {
            Some(mapper) => mapper,
            None => self.select(uri, format)?,
        };
        mapper
            .decode(bytes)
            .map_err(|e| Error::source(format!("cannot decode as {}: {e}", mapper.name())))
    }

    fn by_format(&self, format: &str) -> Option<Arc<dyn FormatMapper>> {
        let format = format.trim();
        self.find(format).or_else(|| {
            // `image/x-foo` or `image/jpg`: try what follows the slash
            let (_, suffix) = format.rsplit_once('/')?;
            self.find(suffix.trim_start_matches("x-"))
        })
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Lowercased extension of a path or URL, ignoring any query or fragment.
fn extension(uri: &str) -> Option<String> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let ext = Path::new(path).extension()?.to_str()?;
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn explicit_format_and_extension_converge() {
        let reg = MapperRegistry::with_builtins();
        let a = reg.select(None, Some("jpeg")).unwrap();
        let b = reg.select(Some("photo.JPG"), None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn format_beats_extension() {
        let reg = MapperRegistry::with_builtins();
        let m = reg.select(Some("out.png"), Some("gif")).unwrap();
        assert_eq!(m.name(), "gif");
    }

    #[test]
    fn mime_types_select_their_mapper() {
        let reg = MapperRegistry::with_builtins();
        assert_eq!(reg.select(None, Some("image/PNG")).unwrap().name(), "png");
        assert_eq!(reg.select(None, Some("image/jpg")).unwrap().name(), "jpeg");
        assert_eq!(reg.select(None, Some("image/x-bmp")).unwrap().name(), "bmp");
    }

    #[test]
    fn extension_ignores_query_string() {
        let reg = MapperRegistry::with_builtins();
        let m = reg.select(Some("http://host/a.tif?size=2#top"), None).unwrap();
        assert_eq!(m.name(), "tiff");
    }

    #[test]
    fn unknown_formats_fail() {
        let reg = MapperRegistry::with_builtins();
        assert!(matches!(reg.select(None, Some("psd")), Err(Error::UnknownFormat(_))));
        assert!(matches!(reg.select(Some("photo"), None), Err(Error::UnknownFormat(_))));
        assert!(matches!(reg.select(None, None), Err(Error::UnknownFormat(_))));
    }

    #[test]
    fn mime_type_lookup() {
        let reg = MapperRegistry::with_builtins();
        assert_eq!(reg.mime_type("jpg").unwrap(), "image/jpeg");
        assert_eq!(reg.mime_type("TIF").unwrap(), "image/tiff");
    }

    struct Fake;

    impl FormatMapper for Fake {
        fn name(&self) -> &str {
            "fake"
        }
        fn aliases(&self) -> &[&'static str] {
            &["png"]
        }
        fn mime_type(&self) -> &str {
            "image/x-fake"
        }
        fn decode(&self, _bytes: &[u8]) -> Result<PixelBuffer> {
            PixelBuffer::new_true_color(1, 1)
        }
        fn encode(&self, _buffer: &PixelBuffer, _options: &SaveOptions) -> Result<Vec<u8>> {
            Ok(b"fake".to_vec())
        }
    }

    #[test]
    fn registered_mapper_shadows_builtin() {
        let reg = MapperRegistry::with_builtins();
        reg.register(Arc::new(Fake));
        assert_eq!(reg.select(Some("x.png"), None).unwrap().name(), "fake");
        assert_eq!(reg.select(None, Some("image/x-fake")).unwrap().name(), "fake");
        assert!(reg.names().contains(&"fake".to_string()));
    }

    #[test]
    fn save_without_destination_returns_bytes() {
        let reg = MapperRegistry::with_builtins();
        let png = reg.select(None, Some("png")).unwrap();
        let bytes = png
            .save(solid(3, 3, RED).handle(), None, &SaveOptions::default())
            .unwrap()
            .unwrap();
        let back = reg.decode(&bytes, None, None).unwrap();
        assert_eq!(back.get_rgba(1, 1), RED);
    }

    #[test]
    fn save_to_path_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.bmp");
        let reg = MapperRegistry::with_builtins();
        let bmp = reg.select(Some(path.to_str().unwrap()), None).unwrap();
        let written = bmp
            .save(solid(2, 2, BLUE).handle(), Some(&path), &SaveOptions::default())
            .unwrap();
        assert!(written.is_none());
        assert_eq!(bmp.load(&path).unwrap().get_rgba(0, 0), BLUE);
    }

    #[test]
    fn undecodable_bytes_are_an_invalid_source() {
        let reg = MapperRegistry::with_builtins();
        let err = reg.decode(b"\x01\x02\x03", None, Some("png")).unwrap_err();
        assert!(matches!(err, Error::InvalidImageSource(_)));
    }
}
