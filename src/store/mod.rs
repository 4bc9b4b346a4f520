//! Document and blob storage seams.
//!
//! The uploader only talks to these traits. `local` keeps everything on disk,
//! `memory` keeps it in process, and `crate::firebase` talks to the hosted
//! services.

pub mod local;
pub mod memory;

use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::Document;

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Local file operation failed
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    /// Stored data could not be decoded
    #[error("invalid document at '{path}': {message}")]
    InvalidDocument { path: String, message: String },
    /// Path contains empty, `.` or `..` segments
    #[error("invalid storage path '{0}'")]
    InvalidPath(String),
    /// Stored size differs from the size that was sent
    #[error("size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("not found: {0}")]
    NotFound(String),
    /// Backend requires a signed-in identity
    #[error("not signed in")]
    NotSignedIn,
}

/// Whole-document store addressed by slash-separated paths
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.get(path)?.is_some())
    }

    /// Atomic whole-document overwrite
    fn put(&self, path: &str, document: &Document) -> Result<(), StoreError>;

    /// Write `document` only if nothing is stored at `path` yet.
    ///
    /// Returns `true` when this call performed the write. Backends with a
    /// conditional write override this; the default is check-then-put.
    fn create_if_absent(&self, path: &str, document: &Document) -> Result<bool, StoreError> {
        if self.exists(path)? {
            return Ok(false);
        }
        self.put(path, document)?;
        Ok(true)
    }
}

/// Progress callback: (bytes_uploaded, total_bytes)
pub type ByteProgress<'a> = &'a mut dyn FnMut(u64, u64);

/// Binary object store
pub trait BlobStore: Send + Sync {
    /// Stream `media` to `path`, reporting bytes as they are sent
    fn put_streaming(
        &self,
        path: &str,
        media: MediaFile,
        on_progress: ByteProgress<'_>,
    ) -> Result<(), StoreError>;

    /// Stable URL for an object previously stored at `path`
    fn download_url(&self, path: &str) -> Result<String, StoreError>;
}

/// A media file to upload: name, size and a byte source
pub struct MediaFile {
    file_name: String,
    size: u64,
    reader: Box<dyn Read + Send>,
}

impl MediaFile {
    /// Open a local file, taking its name and size from the filesystem
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;

        Ok(Self {
            file_name,
            size,
            reader: Box::new(file),
        })
    }

    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            size: bytes.len() as u64,
            reader: Box::new(Cursor::new(bytes)),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// MIME type guessed from the file extension
    pub fn content_type(&self) -> &'static str {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mp4") | Some("m4v") => "video/mp4",
            Some("webm") => "video/webm",
            Some("mov") => "video/quicktime",
            Some("mkv") => "video/x-matroska",
            Some("mp3") => "audio/mpeg",
            Some("m4a") => "audio/mp4",
            Some("ogg") | Some("opus") => "audio/ogg",
            _ => "application/octet-stream",
        }
    }

    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }
}

impl fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaFile")
            .field("file_name", &self.file_name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Split a storage path into its segments, rejecting traversal and empty parts
pub(crate) fn path_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_from_bytes() {
        let media = MediaFile::from_bytes("Lesson.MP4", vec![0u8; 10]);
        assert_eq!(media.file_name(), "Lesson.MP4");
        assert_eq!(media.size(), 10);
        assert_eq!(media.content_type(), "video/mp4");

        let other = MediaFile::from_bytes("notes.bin", Vec::new());
        assert_eq!(other.content_type(), "application/octet-stream");
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(
            path_segments("lessons/spanish").unwrap(),
            vec!["lessons", "spanish"]
        );
        assert!(path_segments("lessons/../etc").is_err());
        assert!(path_segments("/lessons").is_err());
        assert!(path_segments("lessons//x").is_err());
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::SizeMismatch {
            expected: 1000,
            actual: 900,
        };
        assert!(err.to_string().contains("1000"));
        assert!(err.to_string().contains("900"));
    }
}
