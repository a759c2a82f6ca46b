//! The object everything else hangs off.
//!
//! A [`Context`] owns the operation registry, the mapper registry, the table
//! of pending uploads and the reader used for paths. Build one at startup,
//! register extension operations and mappers on it, then share it: every
//! method takes `&self`.
//!
//! ```no_run
//! use widepix::context::Context;
//!
//! let ctx = Context::new();
//! let img = ctx.load("photo.jpg", None)?;
//! let thumb = img.resize(ctx.operations(), Some(120.into()), None, Default::default(), Default::default())?;
//! thumb.save_to_file(ctx.mappers(), "thumb.png", None, &Default::default())?;
//! # Ok::<(), widepix::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::image::Image;
use crate::mapper::MapperRegistry;
use crate::operation::OperationRegistry;
use crate::raster::PixelBuffer;
use crate::source::{self, FileReader, LoadSource, SourceKind, SourceReader, UploadTable};
use std::path::Path;
use tracing::debug;

pub struct Context {
    operations: OperationRegistry,
    mappers: MapperRegistry,
    uploads: UploadTable,
    reader: Box<dyn SourceReader>,
}

impl Context {
    /// Built-in operations and mappers, no uploads, local file reader.
    pub fn new() -> Self {
        Self {
            operations: OperationRegistry::with_builtins(),
            mappers: MapperRegistry::with_builtins(),
            uploads: UploadTable::new(),
            reader: Box::new(FileReader),
        }
    }

    pub fn with_reader(mut self, reader: impl SourceReader + 'static) -> Self {
        self.reader = Box::new(reader);
        self
    }

    pub fn with_uploads(mut self, uploads: UploadTable) -> Self {
        self.uploads = uploads;
        self
    }

    pub fn operations(&self) -> &OperationRegistry {
        &self.operations
    }

    pub fn mappers(&self) -> &MapperRegistry {
        &self.mappers
    }

    pub fn uploads(&self) -> &UploadTable {
        &self.uploads
    }

    pub fn uploads_mut(&mut self) -> &mut UploadTable {
        &mut self.uploads
    }

    /// Load from a source of unknown kind; see [`source`] for the rules.
    pub fn load(&self, source: impl Into<LoadSource>, format: Option<&str>) -> Result<Image> {
        let source = source.into();
        let kind = source::classify(&source, &self.uploads);
        debug!(?kind, ?format, "classified load source");
        match (kind, source) {
            (_, LoadSource::Handle(buffer)) => self.load_from_handle(buffer),
            (SourceKind::Upload, LoadSource::Value(bytes)) => {
                self.load_from_upload(&String::from_utf8_lossy(&bytes))
            }
            (SourceKind::Upload, LoadSource::Path(path)) => {
                self.load_from_upload(&path.to_string_lossy())
            }
            (SourceKind::Binary, LoadSource::Value(bytes)) => self.load_from_bytes(&bytes, format),
            (_, LoadSource::Value(bytes)) => self.load_from_file(source::path_from_bytes(bytes), format),
            (_, LoadSource::Path(path)) => self.load_from_file(path, format),
        }
    }

    pub fn load_from_handle(&self, buffer: PixelBuffer) -> Result<Image> {
        Image::from_handle(buffer)
    }

    /// Decode in-memory image data. The content decides the format; `format`
    /// is only consulted when the content is not recognised.
    pub fn load_from_bytes(&self, bytes: &[u8], format: Option<&str>) -> Result<Image> {
        let buffer = self
            .mappers
            .decode(bytes, None, format)
            .map_err(|e| invalid_source(e, "data does not contain a valid image"))?;
        Image::from_handle(buffer)
    }

    /// Read `location` through the reader and decode it, falling back to the
    /// mapper named by `format` or the extension when sniffing fails.
    pub fn load_from_file(&self, location: impl AsRef<Path>, format: Option<&str>) -> Result<Image> {
        let location = location.as_ref();
        let bytes = self.reader.read(location)?;
        // the name only hints at the format here; the read above used the exact path
        let uri = location.to_string_lossy();
        let buffer = self
            .mappers
            .decode(&bytes, Some(&*uri), format)
            .map_err(|e| invalid_source(e, &format!("'{uri}' is not a valid image source")))?;
        Image::from_handle(buffer)
    }

    pub fn load_from_upload(&self, field: &str) -> Result<Image> {
        let upload = self
            .uploads
            .get(field)
            .filter(|u| u.tmp_path.is_file())
            .ok_or_else(|| Error::source(format!("upload field '{field}' or its file doesn't exist")))?;
        self.load_from_file(&upload.tmp_path, upload.mime_type.as_deref())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid_source(err: Error, message: &str) -> Error {
    match err {
        Error::UnknownFormat(_) => Error::source(message),
        other => other,
    }
}
