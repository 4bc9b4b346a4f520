use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use log::debug;
use reqwest::blocking::Body;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Read;
use std::thread;
use std::time::Duration;

use super::{rejection, FirebaseBackend};
use crate::store::{path_segments, BlobStore, ByteProgress, MediaFile, StoreError};

/// Object metadata fields we read back from Cloud Storage
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    /// Decimal string
    #[serde(default)]
    size: Option<String>,
    /// Comma-separated download tokens
    #[serde(default)]
    download_tokens: Option<String>,
}

/// Counts bytes as the HTTP client pulls them and forwards the running total
struct ProgressReader {
    inner: Box<dyn Read + Send>,
    sent: u64,
    progress: Sender<u64>,
}

impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.sent += n as u64;
            // Receiver gone only means nobody is watching
            let _ = self.progress.send(self.sent);
        }
        Ok(n)
    }
}

impl FirebaseBackend {
    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/v0/b/{}/o/{}",
            self.storage_endpoint,
            self.storage_bucket,
            urlencoding::encode(path)
        )
    }

    fn object_metadata(&self, path: &str) -> Result<ObjectMetadata, StoreError> {
        let response = self
            .http
            .get(self.object_url(path))
            .header(AUTHORIZATION, format!("Firebase {}", self.token()?))
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(rejection(response));
        }
        Ok(response.json()?)
    }
}

impl BlobStore for FirebaseBackend {
    /// Uploads on a worker thread while this thread relays progress
    fn put_streaming(
        &self,
        path: &str,
        media: MediaFile,
        on_progress: ByteProgress<'_>,
    ) -> Result<(), StoreError> {
        path_segments(path)?;
        let token = self.token()?;
        let size = media.size();
        let content_type = media.content_type();

        let (tx, rx) = unbounded();
        let body = Body::sized(
            ProgressReader {
                inner: media.into_reader(),
                sent: 0,
                progress: tx,
            },
            size,
        );

        let request = self
            .http
            .post(format!(
                "{}/v0/b/{}/o",
                self.storage_endpoint, self.storage_bucket
            ))
            .query(&[("uploadType", "media"), ("name", path)])
            .header(AUTHORIZATION, format!("Firebase {}", token))
            .header(CONTENT_TYPE, content_type)
            .body(body);

        let result = thread::scope(|scope| {
            let upload = scope.spawn(move || request.send());

            loop {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(uploaded) => on_progress(uploaded, size),
                    Err(RecvTimeoutError::Timeout) if upload.is_finished() => break,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            for uploaded in rx.try_iter() {
                on_progress(uploaded, size);
            }

            upload
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });

        let response = result?;
        if !response.status().is_success() {
            return Err(rejection(response));
        }

        let metadata: ObjectMetadata = response.json()?;
        if let Some(stored) = metadata.size.and_then(|s| s.parse::<u64>().ok()) {
            if stored != size {
                return Err(StoreError::SizeMismatch {
                    expected: size,
                    actual: stored,
                });
            }
        }

        debug!("Stored object {} ({} bytes)", path, size);
        Ok(())
    }

    fn download_url(&self, path: &str) -> Result<String, StoreError> {
        let metadata = self.object_metadata(path)?;
        let token = metadata
            .download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').map(str::trim).find(|t| !t.is_empty()))
            .ok_or_else(|| StoreError::NotFound(format!("download token for '{}'", path)))?;

        Ok(format!(
            "{}?alt=media&token={}",
            self.object_url(path),
            urlencoding::encode(token)
        ))
    }
}
