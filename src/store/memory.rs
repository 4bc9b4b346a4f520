use std::collections::BTreeMap;
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{path_segments, BlobStore, ByteProgress, DocumentStore, MediaFile, StoreError};
use crate::model::Document;

/// Which kind of object a recorded write touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Document,
    Blob,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub path: String,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<String, Document>,
    blobs: BTreeMap<String, Vec<u8>>,
    writes: Vec<WriteRecord>,
}

/// In-process document and blob store that records every write.
///
/// Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn document(&self, path: &str) -> Option<Document> {
        self.lock().documents.get(path).cloned()
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(path).cloned()
    }

    pub fn document_paths(&self) -> Vec<String> {
        self.lock().documents.keys().cloned().collect()
    }

    /// Every write in the order it happened
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, path: &str) -> usize {
        self.lock().writes.iter().filter(|w| w.path == path).count()
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        path_segments(path)?;
        Ok(self.document(path))
    }

    fn put(&self, path: &str, document: &Document) -> Result<(), StoreError> {
        path_segments(path)?;
        let mut inner = self.lock();
        inner.documents.insert(path.to_string(), document.clone());
        inner.writes.push(WriteRecord {
            kind: WriteKind::Document,
            path: path.to_string(),
        });
        Ok(())
    }

    fn create_if_absent(&self, path: &str, document: &Document) -> Result<bool, StoreError> {
        path_segments(path)?;
        let mut inner = self.lock();
        if inner.documents.contains_key(path) {
            return Ok(false);
        }
        inner.documents.insert(path.to_string(), document.clone());
        inner.writes.push(WriteRecord {
            kind: WriteKind::Document,
            path: path.to_string(),
        });
        Ok(true)
    }
}

impl BlobStore for MemoryStore {
    fn put_streaming(
        &self,
        path: &str,
        media: MediaFile,
        on_progress: ByteProgress<'_>,
    ) -> Result<(), StoreError> {
        path_segments(path)?;
        let size = media.size();
        let mut reader = media.into_reader();
        let mut data = Vec::with_capacity(size as usize);
        let mut chunk = [0u8; 8192];

        loop {
            let n = reader.read(&mut chunk).map_err(|source| StoreError::Io {
                path: path.into(),
                source,
            })?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
            on_progress(data.len() as u64, size);
        }

        if data.len() as u64 != size {
            return Err(StoreError::SizeMismatch {
                expected: size,
                actual: data.len() as u64,
            });
        }

        let mut inner = self.lock();
        inner.blobs.insert(path.to_string(), data);
        inner.writes.push(WriteRecord {
            kind: WriteKind::Blob,
            path: path.to_string(),
        });
        Ok(())
    }

    fn download_url(&self, path: &str) -> Result<String, StoreError> {
        if self.lock().blobs.contains_key(path) {
            Ok(format!("memory://{}", path))
        } else {
            Err(StoreError::NotFound(path.to_string()))
        }
    }
}
