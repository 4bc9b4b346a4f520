use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const TARGET_LANGUAGE: &str = "targetLanguage";
pub const NATIVE_LANGUAGE: &str = "nativeLanguage";
pub const START_TIME: &str = "startTime";
pub const END_TIME: &str = "endTime";
pub const TIMESTAMP: &str = "timestamp";

/// Transcript parsing errors
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// No header, or a header with no data rows below it
    #[error("CSV file is empty or has no transcript rows")]
    Empty,
    /// The file could not be read as comma-separated text
    #[error("failed to process CSV file, please check the format: {0}")]
    Malformed(#[from] csv::Error),
    /// A required column is blank or absent on a data row (1-based)
    #[error("missing field '{column}' in CSV at row {row}, ensure all columns are correctly filled")]
    MissingField { row: usize, column: &'static str },
    /// Transcript file could not be opened
    #[error("failed to open transcript file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One aligned line of a lesson transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptRow {
    pub target_language: String,
    pub native_language: String,
    #[serde(flatten)]
    pub timing: TranscriptTiming,
}

/// Timing attached to a transcript row, depending on the file's schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptTiming {
    /// `startTime` / `endTime` columns
    Span {
        #[serde(rename = "startTime")]
        start_time: String,
        #[serde(rename = "endTime")]
        end_time: String,
    },
    /// single `timestamp` column
    Point { timestamp: String },
}

/// The two accepted header layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptSchema {
    /// targetLanguage, nativeLanguage, startTime, endTime
    StartEnd,
    /// targetLanguage, nativeLanguage, timestamp
    Timestamp,
}

impl TranscriptSchema {
    /// Pick the schema from a header row.
    ///
    /// Any start/end column selects `StartEnd`; otherwise a `timestamp` column
    /// selects `Timestamp`. Headers matching neither fall back to `StartEnd`, so
    /// the absent columns are reported as missing fields on the first row.
    pub fn detect(headers: &StringRecord) -> Self {
        let has = |name: &str| headers.iter().any(|h| h == name);
        if has(START_TIME) || has(END_TIME) {
            TranscriptSchema::StartEnd
        } else if has(TIMESTAMP) {
            TranscriptSchema::Timestamp
        } else {
            TranscriptSchema::StartEnd
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            TranscriptSchema::StartEnd => &[TARGET_LANGUAGE, NATIVE_LANGUAGE, START_TIME, END_TIME],
            TranscriptSchema::Timestamp => &[TARGET_LANGUAGE, NATIVE_LANGUAGE, TIMESTAMP],
        }
    }
}

/// Maps column names to their positions in the header row
struct ColumnIndex {
    headers: Vec<String>,
}

impl ColumnIndex {
    fn new(headers: &StringRecord) -> Self {
        Self {
            headers: headers
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').to_string())
                .collect(),
        }
    }

    /// Trimmed, non-empty value of `column` on `record`, or a MissingField error.
    fn field(
        &self,
        record: &StringRecord,
        row: usize,
        column: &'static str,
    ) -> Result<String, TranscriptError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(TranscriptError::MissingField { row, column })
    }
}

/// Parse comma-separated transcript text with a header row.
///
/// Rows come back in file order with every field trimmed. Blank lines are
/// skipped. The first invalid row fails the whole parse; no partial result is
/// returned.
pub fn parse_transcript<R: Read>(reader: R) -> Result<Vec<TranscriptRow>, TranscriptError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    if headers.iter().all(|h| h.trim_start_matches('\u{feff}').is_empty()) {
        return Err(TranscriptError::Empty);
    }

    let columns = ColumnIndex::new(&headers);
    let schema = TranscriptSchema::detect(&StringRecord::from(columns.headers.clone()));

    let mut rows = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        let row = index + 1;

        let target_language = columns.field(&record, row, TARGET_LANGUAGE)?;
        let native_language = columns.field(&record, row, NATIVE_LANGUAGE)?;
        let timing = match schema {
            TranscriptSchema::StartEnd => TranscriptTiming::Span {
                start_time: columns.field(&record, row, START_TIME)?,
                end_time: columns.field(&record, row, END_TIME)?,
            },
            TranscriptSchema::Timestamp => TranscriptTiming::Point {
                timestamp: columns.field(&record, row, TIMESTAMP)?,
            },
        };

        rows.push(TranscriptRow {
            target_language,
            native_language,
            timing,
        });
    }

    if rows.is_empty() {
        return Err(TranscriptError::Empty);
    }

    Ok(rows)
}

pub fn parse_transcript_str(text: &str) -> Result<Vec<TranscriptRow>, TranscriptError> {
    parse_transcript(text.as_bytes())
}

/// Open and parse a transcript file from disk
pub fn parse_transcript_file(path: &Path) -> Result<Vec<TranscriptRow>, TranscriptError> {
    let file = File::open(path).map_err(|source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_transcript(file)
}
