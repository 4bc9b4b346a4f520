//! Lesson upload sequencing: section marker, optional media, content document.

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::form::{LessonSubmission, VideoSource};
use crate::model::{self, ContentRecord, LanguageSection};
use crate::store::{BlobStore, DocumentStore, MediaFile, StoreError};

/// Terminal failure of a lesson upload. Each variant names the step that failed.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to create language section '{language}': {source}")]
    Section {
        language: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to upload media to '{path}': {source}")]
    MediaUpload {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to resolve download URL for '{path}': {source}")]
    UrlResolution {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to write content document '{path}': {source}")]
    DocumentWrite {
        path: String,
        #[source]
        source: StoreError,
    },
}

/// Runs one lesson submission against a document store and a blob store.
///
/// Steps run in order and stop at the first failure. There are no retries and
/// no compensating deletes: media uploaded before a failed document write stays
/// in blob storage.
pub struct LessonUploader<'a> {
    documents: &'a dyn DocumentStore,
    blobs: &'a dyn BlobStore,
}

impl<'a> LessonUploader<'a> {
    pub fn new(documents: &'a dyn DocumentStore, blobs: &'a dyn BlobStore) -> Self {
        Self { documents, blobs }
    }

    /// Create the `lessons/<language>` marker unless it already exists.
    ///
    /// Returns whether this call created it. Concurrent callers for a new
    /// language may both write; the marker only holds a timestamp so the last
    /// write wins harmlessly on stores without conditional writes.
    pub fn ensure_section(&self, language: &str) -> Result<bool, UploadError> {
        let section = LanguageSection::new(language);
        let path = section.path();

        let created = self
            .documents
            .create_if_absent(&path, &section.to_document())
            .map_err(|source| UploadError::Section {
                language: section.language_id.clone(),
                source,
            })?;

        if created {
            info!("Created language section: {}", section.language_id);
        } else {
            debug!("Language section {} already exists", section.language_id);
        }
        Ok(created)
    }

    /// Stream `media` to `videos/<language>/<documentName>/<filename>` and
    /// return its download URL. `on_progress` receives percentages in 0..=100.
    pub fn upload_media(
        &self,
        language: &str,
        document_name: &str,
        media: MediaFile,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<String, UploadError> {
        let path = model::media_path(language, document_name, media.file_name());
        let size = media.size();
        info!("Uploading {} ({} bytes) to {}", media.file_name(), size, path);

        let mut report = |uploaded: u64, total: u64| {
            let percent = if total == 0 {
                100.0
            } else {
                (uploaded as f64 / total as f64 * 100.0).min(100.0)
            };
            debug!("Upload is {:.1}% done", percent);
            on_progress(percent);
        };

        self.blobs
            .put_streaming(&path, media, &mut report)
            .map_err(|source| UploadError::MediaUpload {
                path: path.clone(),
                source,
            })?;
        if size == 0 {
            on_progress(100.0);
        }

        let url = self
            .blobs
            .download_url(&path)
            .map_err(|source| UploadError::UrlResolution {
                path: path.clone(),
                source,
            })?;
        info!("Video uploaded to: {}", url);
        Ok(url)
    }

    /// Persist a complete lesson and return the record as written
    pub fn submit(
        &self,
        submission: LessonSubmission,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<ContentRecord, UploadError> {
        let document_name = submission.document_name();
        self.ensure_section(&submission.language)?;

        let (media_reference, uploaded) = match submission.video {
            VideoSource::Upload(media) => {
                let url =
                    self.upload_media(&submission.language, &document_name, media, on_progress)?;
                (url, true)
            }
            VideoSource::External(url) => (url, false),
        };

        let record = ContentRecord {
            title: submission.title,
            description: submission.description,
            media_reference,
            video_start: submission.video_start,
            video_end: submission.video_end,
            language: submission.language,
            content_number: submission.content_number,
            created_at: Utc::now(),
            transcript: submission.transcript,
        };

        let path = record.path();
        if let Err(source) = self.documents.put(&path, &record.to_document()) {
            if uploaded {
                warn!(
                    "Content write failed; media at {} is left without a document",
                    record.media_reference
                );
            }
            return Err(UploadError::DocumentWrite { path, source });
        }

        info!("Uploaded content to: {}", path);
        Ok(record)
    }
}
