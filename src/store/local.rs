use log::debug;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

use super::{path_segments, BlobStore, ByteProgress, DocumentStore, MediaFile, StoreError};
use crate::model::{document_from_json, document_to_json, Document};

/// Options for blob writes
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Buffer size for reading/writing (default: 64KB)
    pub buffer_size: usize,
    /// Verify file size after upload
    pub verify_size: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024,
            verify_size: true,
        }
    }
}

/// Filesystem-backed document and blob store.
///
/// Layout under `root`:
/// - `documents/<path>.json` for documents
/// - `blobs/<path>` for uploaded media
pub struct LocalStore {
    root: PathBuf,
    public_base_url: Option<Url>,
    options: UploadOptions,
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
            options: UploadOptions::default(),
        }
    }

    /// Serve blob URLs from `base` instead of `file://` URLs
    pub fn with_public_base_url(mut self, base: Url) -> Self {
        self.public_base_url = Some(base);
        self
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_file(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut file = self.root.join("documents");
        for segment in path_segments(path)? {
            file.push(segment);
        }
        let mut name = file.into_os_string();
        name.push(".json");
        Ok(PathBuf::from(name))
    }

    fn blob_file(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut file = self.root.join("blobs");
        for segment in path_segments(path)? {
            file.push(segment);
        }
        Ok(file)
    }

    /// Serialize a document into a temp file next to `target`
    fn stage_document(&self, target: &Path, document: &Document) -> Result<NamedTempFile, StoreError> {
        let dir = target
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(target.display().to_string()))?;
        fs::create_dir_all(dir).map_err(io_error(dir))?;

        let json = serde_json::Value::Object(document_to_json(document));
        let mut staged = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
        serde_json::to_writer_pretty(&mut staged, &json).map_err(|e| StoreError::Io {
            path: target.to_path_buf(),
            source: e.into(),
        })?;
        staged.flush().map_err(io_error(target))?;
        Ok(staged)
    }
}

impl DocumentStore for LocalStore {
    fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let file = self.document_file(path)?;
        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&file)(e)),
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| StoreError::InvalidDocument {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        match value {
            serde_json::Value::Object(fields) => Ok(Some(document_from_json(&fields))),
            _ => Err(StoreError::InvalidDocument {
                path: path.to_string(),
                message: "top-level value is not an object".to_string(),
            }),
        }
    }

    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.document_file(path)?.is_file())
    }

    fn put(&self, path: &str, document: &Document) -> Result<(), StoreError> {
        let target = self.document_file(path)?;
        let staged = self.stage_document(&target, document)?;
        staged
            .persist(&target)
            .map_err(|e| io_error(&target)(e.error))?;
        debug!("Wrote document {}", target.display());
        Ok(())
    }

    fn create_if_absent(&self, path: &str, document: &Document) -> Result<bool, StoreError> {
        let target = self.document_file(path)?;
        let staged = self.stage_document(&target, document)?;
        match staged.persist_noclobber(&target) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_error(&target)(e.error)),
        }
    }
}

impl BlobStore for LocalStore {
    /// Streams into `<target>.tmpupload`, checks the size, then renames into place
    fn put_streaming(
        &self,
        path: &str,
        media: MediaFile,
        on_progress: ByteProgress<'_>,
    ) -> Result<(), StoreError> {
        let target = self.blob_file(path)?;
        let temp_path = PathBuf::from(format!("{}.tmpupload", target.display()));

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let size = media.size();
        let mut reader = media.into_reader();
        let mut out = File::create(&temp_path).map_err(io_error(&temp_path))?;

        let mut buffer = vec![0u8; self.options.buffer_size];
        let mut uploaded = 0u64;

        let copied = (|| -> Result<(), StoreError> {
            loop {
                let n = reader.read(&mut buffer).map_err(io_error(&temp_path))?;
                if n == 0 {
                    break;
                }
                out.write_all(&buffer[..n]).map_err(io_error(&temp_path))?;
                uploaded += n as u64;
                on_progress(uploaded, size);
            }
            out.flush().map_err(io_error(&temp_path))?;
            out.sync_all().map_err(io_error(&temp_path))
        })();

        if let Err(e) = copied {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        drop(out);

        if self.options.verify_size {
            let actual = fs::metadata(&temp_path)
                .map_err(io_error(&temp_path))?
                .len();
            if actual != size {
                let _ = fs::remove_file(&temp_path);
                return Err(StoreError::SizeMismatch {
                    expected: size,
                    actual,
                });
            }
        }

        fs::rename(&temp_path, &target).map_err(io_error(&target))?;
        debug!("Stored blob {} ({} bytes)", target.display(), uploaded);
        Ok(())
    }

    fn download_url(&self, path: &str) -> Result<String, StoreError> {
        let file = self.blob_file(path)?;
        if !file.is_file() {
            return Err(StoreError::NotFound(path.to_string()));
        }

        match &self.public_base_url {
            Some(base) => {
                let mut url = base.clone();
                url.path_segments_mut()
                    .map_err(|_| StoreError::InvalidPath(base.to_string()))?
                    .pop_if_empty()
                    .extend(path_segments(path)?);
                Ok(url.into())
            }
            None => {
                let absolute = file.canonicalize().map_err(io_error(&file))?;
                Url::from_file_path(&absolute)
                    .map(String::from)
                    .map_err(|_| StoreError::InvalidPath(absolute.display().to_string()))
            }
        }
    }
}
