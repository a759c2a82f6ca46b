//! Load sources and how an untyped one is classified.
//!
//! [`Context::load`](crate::context::Context::load) accepts anything that
//! converts into a [`LoadSource`] and decides what it is, in this order:
//!
//! 1. a pixel buffer → wrapped as-is;
//! 2. the name of a pending upload → that upload's temporary file;
//! 3. any byte below 32 in the first [`SNIFF_WINDOW`] bytes → encoded image data;
//! 4. anything else → a path or URI for the [`SourceReader`].
//!
//! Step 3 is what tells `b"\x89PNG\r\n..."` apart from `"photos/a.png"`:
//! every supported binary header has a control byte early on, and paths
//! never do. A [`Path`] skips step 3 and keeps its exact bytes, so names
//! that are not valid UTF-8 still open.

use crate::error::{Error, Result};
use crate::raster::PixelBuffer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// How many leading bytes are inspected for binary content.
pub const SNIFF_WINDOW: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadSource {
    Handle(PixelBuffer),
    Value(Vec<u8>),
    Path(PathBuf),
}

impl From<PixelBuffer> for LoadSource {
    fn from(buffer: PixelBuffer) -> Self {
        LoadSource::Handle(buffer)
    }
}

impl From<&str> for LoadSource {
    fn from(s: &str) -> Self {
        LoadSource::Value(s.as_bytes().to_vec())
    }
}

impl From<String> for LoadSource {
    fn from(s: String) -> Self {
        LoadSource::Value(s.into_bytes())
    }
}

impl From<&[u8]> for LoadSource {
    fn from(bytes: &[u8]) -> Self {
        LoadSource::Value(bytes.to_vec())
    }
}

impl From<Vec<u8>> for LoadSource {
    fn from(bytes: Vec<u8>) -> Self {
        LoadSource::Value(bytes)
    }
}

impl From<&Path> for LoadSource {
    fn from(path: &Path) -> Self {
        LoadSource::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for LoadSource {
    fn from(path: PathBuf) -> Self {
        LoadSource::Path(path)
    }
}

/// Path named by raw bytes that were not recognised as image data.
#[cfg(unix)]
pub fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes))
}

/// Path named by raw bytes that were not recognised as image data.
#[cfg(not(unix))]
pub fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// What a [`LoadSource`] turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Handle,
    Upload,
    Binary,
    File,
}

/// True when a byte below 32 appears in the first [`SNIFF_WINDOW`] bytes.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(SNIFF_WINDOW).any(|b| *b < 32)
}

pub fn classify(source: &LoadSource, uploads: &UploadTable) -> SourceKind {
    match source {
        LoadSource::Handle(_) => SourceKind::Handle,
        LoadSource::Value(bytes) => {
            let is_upload = std::str::from_utf8(bytes).is_ok_and(|name| uploads.contains(name));
            if is_upload {
                SourceKind::Upload
            } else if is_binary(bytes) {
                SourceKind::Binary
            } else {
                SourceKind::File
            }
        }
        LoadSource::Path(path) => {
            if path.to_str().is_some_and(|name| uploads.contains(name)) {
                SourceKind::Upload
            } else {
                SourceKind::File
            }
        }
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// A file received under a form field and parked in a temporary location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub tmp_path: PathBuf,
    /// Client-declared MIME type, used as a format hint.
    pub mime_type: Option<String>,
}

/// Pending uploads by form field name.
#[derive(Debug, Clone, Default)]
pub struct UploadTable {
    fields: HashMap<String, PendingUpload>,
}

impl UploadTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, upload: PendingUpload) {
        self.fields.insert(field.into(), upload);
    }

    pub fn get(&self, field: &str) -> Option<&PendingUpload> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<PendingUpload> {
        self.fields.remove(field)
    }
}

// ============================================================================
// Readers
// ============================================================================

/// Fetches the raw bytes behind a path or URI.
pub trait SourceReader: Send + Sync {
    fn read(&self, location: &Path) -> Result<Vec<u8>>;
}

/// Reads local files. Remote URIs are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReader;

fn is_remote(location: &Path) -> bool {
    let Some(uri) = location.to_str() else {
        return false;
    };
    let lower = uri.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl SourceReader for FileReader {
    fn read(&self, location: &Path) -> Result<Vec<u8>> {
        let shown = location.display();
        if is_remote(location) {
            return Err(Error::source(format!("'{shown}': remote sources need a reader that can fetch them")));
        }
        std::fs::read(location).map_err(|e| Error::source(format!("cannot read '{shown}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploads_with(field: &str) -> UploadTable {
        let mut table = UploadTable::new();
        table.insert(
            field,
            PendingUpload {
                tmp_path: PathBuf::from("/tmp/upload-1"),
                mime_type: Some("image/png".into()),
            },
        );
        table
    }

    #[test]
    fn handles_win() {
        let buffer = PixelBuffer::new_true_color(1, 1).unwrap();
        assert_eq!(classify(&buffer.into(), &UploadTable::new()), SourceKind::Handle);
    }

    #[test]
    fn control_byte_inside_window_is_binary() {
        let mut bytes = vec![b'a'; 100];
        bytes[63] = b'\n';
        assert_eq!(classify(&bytes.into(), &UploadTable::new()), SourceKind::Binary);
    }

    #[test]
    fn control_byte_past_window_is_a_path() {
        let mut bytes = vec![b'a'; 100];
        bytes[64] = 0;
        assert_eq!(classify(&bytes.into(), &UploadTable::new()), SourceKind::File);
    }

    #[test]
    fn png_signature_is_binary() {
        let source = LoadSource::from(&b"\x89PNG\r\n\x1a\n"[..]);
        assert_eq!(classify(&source, &UploadTable::new()), SourceKind::Binary);
    }

    #[test]
    fn plain_paths_are_files() {
        let uploads = UploadTable::new();
        assert_eq!(classify(&"photos/a.png".into(), &uploads), SourceKind::File);
        assert_eq!(classify(&Path::new("/x/y.gif").into(), &uploads), SourceKind::File);
        assert_eq!(classify(&"".into(), &uploads), SourceKind::File);
    }

    #[test]
    fn upload_field_names_are_uploads() {
        let uploads = uploads_with("avatar");
        assert_eq!(classify(&"avatar".into(), &uploads), SourceKind::Upload);
        assert_eq!(classify(&"avatar2".into(), &uploads), SourceKind::File);
        assert_eq!(classify(&Path::new("avatar").into(), &uploads), SourceKind::Upload);
    }

    #[test]
    fn paths_keep_their_bytes() {
        let path = PathBuf::from("/x/\u{e9}t\u{e9}.png");
        assert_eq!(LoadSource::from(path.as_path()), LoadSource::Path(path.clone()));
        assert_eq!(path_from_bytes(path.to_str().unwrap().as_bytes().to_vec()), path);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_bytes_become_the_same_path() {
        use std::os::unix::ffi::OsStrExt;
        let raw = b"/tmp/caf\xe9.png".to_vec();
        let path = path_from_bytes(raw.clone());
        assert_eq!(path.as_os_str().as_bytes(), &raw[..]);
        assert_eq!(classify(&raw.into(), &UploadTable::new()), SourceKind::File);
    }

    #[test]
    fn file_reader_refuses_remote_uris() {
        let err = FileReader.read(Path::new("HTTPS://example.com/a.png")).unwrap_err();
        assert!(matches!(err, Error::InvalidImageSource(_)));
    }

    #[test]
    fn file_reader_reports_missing_files_as_invalid_source() {
        let err = FileReader.read(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, Error::InvalidImageSource(_)));
    }
}
