use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::transcript::{TranscriptRow, TranscriptTiming};

/// A stored document: field name to typed value
pub type Document = BTreeMap<String, FieldValue>;

/// Typed document field, the subset of value kinds the document stores share
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<FieldValue>),
    Map(Document),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Document> {
        match self {
            FieldValue::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Plain JSON rendering. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Integer(n) => Value::Number((*n).into()),
            FieldValue::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Array(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Map(fields) => Value::Object(document_to_json(fields)),
        }
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => FieldValue::Double(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(items) => FieldValue::Array(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(fields) => FieldValue::Map(document_from_json(fields)),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

pub fn document_to_json(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

pub fn document_from_json(fields: &Map<String, Value>) -> Document {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), FieldValue::from_json(value)))
        .collect()
}

/// Lowercased, trimmed language identifier used for keys and paths
pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

/// Content document key, e.g. `spanish1`
pub fn document_name(language: &str, content_number: u32) -> String {
    format!("{}{}", language, content_number)
}

/// `lessons/<language>`
pub fn section_path(language: &str) -> String {
    format!("lessons/{}", language)
}

/// `lessons/<language>/contentList/<documentName>`
pub fn content_path(language: &str, document_name: &str) -> String {
    format!("lessons/{}/contentList/{}", language, document_name)
}

/// `videos/<language>/<documentName>/<filename>`
pub fn media_path(language: &str, document_name: &str, file_name: &str) -> String {
    format!("videos/{}/{}/{}", language, document_name, file_name)
}

/// Per-language grouping node
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageSection {
    pub language_id: String,
    pub created_at: DateTime<Utc>,
}

impl LanguageSection {
    pub fn new(language_id: &str) -> Self {
        Self {
            language_id: normalize_language(language_id),
            created_at: Utc::now(),
        }
    }

    pub fn path(&self) -> String {
        section_path(&self.language_id)
    }

    /// The section marker stores its creation time only
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("createdAt".to_string(), FieldValue::Timestamp(self.created_at));
        doc
    }
}

/// One lesson as persisted under `lessons/<language>/contentList`
#[derive(Debug, Clone, PartialEq)]
pub struct ContentRecord {
    pub title: String,
    pub description: String,
    /// Retrievable URL of the lesson video
    pub media_reference: String,
    /// Optional clip bounds within the video (HH:MM:SS.mmm)
    pub video_start: Option<String>,
    pub video_end: Option<String>,
    pub language: String,
    pub content_number: u32,
    pub created_at: DateTime<Utc>,
    pub transcript: Vec<TranscriptRow>,
}

/// Nested data slots reserved on every content document, written empty
pub const EXTENSION_SLOTS: [&str; 3] = [
    "contextualization",
    "conversationalFluency",
    "culturalImmersion",
];

impl ContentRecord {
    pub fn document_name(&self) -> String {
        document_name(&self.language, self.content_number)
    }

    pub fn path(&self) -> String {
        content_path(&self.language, &self.document_name())
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert("title".to_string(), self.title.as_str().into());
        doc.insert("description".to_string(), self.description.as_str().into());
        doc.insert("videoUrl".to_string(), self.media_reference.as_str().into());
        if let Some(start) = &self.video_start {
            doc.insert("videoStart".to_string(), start.as_str().into());
        }
        if let Some(end) = &self.video_end {
            doc.insert("videoEnd".to_string(), end.as_str().into());
        }
        doc.insert("language".to_string(), self.language.as_str().into());
        doc.insert(
            "contentNumber".to_string(),
            FieldValue::Integer(i64::from(self.content_number)),
        );
        doc.insert("createdAt".to_string(), FieldValue::Timestamp(self.created_at));
        doc.insert(
            "transcript".to_string(),
            FieldValue::Array(self.transcript.iter().map(transcript_row_value).collect()),
        );
        for slot in EXTENSION_SLOTS {
            doc.insert(slot.to_string(), FieldValue::Map(Document::new()));
        }
        doc
    }
}

fn transcript_row_value(row: &TranscriptRow) -> FieldValue {
    let mut fields = Document::new();
    fields.insert("targetLanguage".to_string(), row.target_language.as_str().into());
    fields.insert("nativeLanguage".to_string(), row.native_language.as_str().into());
    match &row.timing {
        TranscriptTiming::Span {
            start_time,
            end_time,
        } => {
            fields.insert("startTime".to_string(), start_time.as_str().into());
            fields.insert("endTime".to_string(), end_time.as_str().into());
        }
        TranscriptTiming::Point { timestamp } => {
            fields.insert("timestamp".to_string(), timestamp.as_str().into());
        }
    }
    FieldValue::Map(fields)
}
