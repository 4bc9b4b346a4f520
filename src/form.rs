//! Lesson form validation: raw field values in, a checked submission out.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::model::{self, normalize_language};
use crate::store::MediaFile;
use crate::transcript::TranscriptRow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("please fill in the '{0}' field")]
    MissingField(&'static str),
    #[error("language must be a single name without '/', '\\' or control characters, got '{0}'")]
    InvalidLanguage(String),
    #[error("content number must be a positive integer, got '{0}'")]
    InvalidContentNumber(String),
    #[error("please upload a transcript CSV file with at least one row")]
    MissingTranscript,
    #[error("please provide a video file or a video URL")]
    MissingVideo,
    #[error("provide either a video file or a video URL, not both")]
    ConflictingVideo,
    #[error("please enter a valid YouTube URL, got '{0}'")]
    InvalidVideoUrl(String),
    #[error("please enter '{field}' in HH:MM:SS.mmm format, got '{value}'")]
    InvalidTime { field: &'static str, value: String },
}

/// Where the lesson video comes from
#[derive(Debug)]
pub enum VideoSource {
    /// A file uploaded to blob storage with the lesson
    Upload(MediaFile),
    /// An already-hosted video referenced by URL
    External(String),
}

/// Raw lesson form fields as entered
#[derive(Debug, Clone, Default)]
pub struct LessonForm {
    pub language: String,
    pub content_number: String,
    pub title: String,
    pub description: String,
    pub video_url: Option<String>,
    pub video_start: Option<String>,
    pub video_end: Option<String>,
}

/// A validated lesson ready for the uploader
#[derive(Debug)]
pub struct LessonSubmission {
    pub language: String,
    pub content_number: u32,
    pub title: String,
    pub description: String,
    pub video: VideoSource,
    pub video_start: Option<String>,
    pub video_end: Option<String>,
    pub transcript: Vec<TranscriptRow>,
}

impl LessonSubmission {
    /// Document key, e.g. `spanish1`
    pub fn document_name(&self) -> String {
        model::document_name(&self.language, self.content_number)
    }
}

fn video_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(https?://)?(www\.youtube\.com|youtu\.?be)/.+$").expect("valid video URL regex")
    })
}

fn time_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{2}:)?([0-5]?\d):([0-5]?\d)(\.\d{1,3})?$").expect("valid time code regex")
    })
}

/// Check a clip bound in `HH:MM:SS.mmm` form (hours and millis optional)
pub fn is_time_code(value: &str) -> bool {
    time_code_regex().is_match(value)
}

pub fn is_video_url(value: &str) -> bool {
    video_url_regex().is_match(value)
}

fn required(value: &str, field: &'static str) -> Result<String, FormError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FormError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// Trimmed optional value; blank counts as absent
fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn optional_time(value: &Option<String>, field: &'static str) -> Result<Option<String>, FormError> {
    match optional(value) {
        Some(v) if !is_time_code(&v) => Err(FormError::InvalidTime { field, value: v }),
        other => Ok(other),
    }
}

/// The language becomes a path segment and the prefix of the document key
fn checked_language(value: &str) -> Result<String, FormError> {
    let language = normalize_language(&required(value, "language")?);
    let bad_char = |c: char| c == '/' || c == '\\' || c.is_control();
    if language == "." || language == ".." || language.contains(bad_char) {
        return Err(FormError::InvalidLanguage(language));
    }
    Ok(language)
}

impl LessonForm {
    /// Validate the fields together with the parsed transcript and optional media file
    pub fn validate(
        &self,
        transcript: Vec<TranscriptRow>,
        media: Option<MediaFile>,
    ) -> Result<LessonSubmission, FormError> {
        let language = checked_language(&self.language)?;
        let raw_number = required(&self.content_number, "contentNumber")?;
        let content_number = match raw_number.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return Err(FormError::InvalidContentNumber(raw_number)),
        };
        let title = required(&self.title, "title")?;
        let description = required(&self.description, "description")?;

        let video = match (media, optional(&self.video_url)) {
            (Some(_), Some(_)) => return Err(FormError::ConflictingVideo),
            (Some(file), None) => VideoSource::Upload(file),
            (None, Some(url)) if is_video_url(&url) => VideoSource::External(url),
            (None, Some(url)) => return Err(FormError::InvalidVideoUrl(url)),
            (None, None) => return Err(FormError::MissingVideo),
        };

        let video_start = optional_time(&self.video_start, "videoStart")?;
        let video_end = optional_time(&self.video_end, "videoEnd")?;

        if transcript.is_empty() {
            return Err(FormError::MissingTranscript);
        }

        Ok(LessonSubmission {
            language,
            content_number,
            title,
            description,
            video,
            video_start,
            video_end,
            transcript,
        })
    }
}
