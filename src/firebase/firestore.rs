use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::{error_message, rejection, FirebaseBackend};
use crate::model::{Document, FieldValue};
use crate::store::{path_segments, DocumentStore, StoreError};

/// Firestore typed-value JSON for one field
fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Bool(b) => json!({ "booleanValue": b }),
        // int64 travels as a decimal string
        FieldValue::Integer(n) => json!({ "integerValue": n.to_string() }),
        FieldValue::Double(f) => json!({ "doubleValue": f }),
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::Micros, true) })
        }
        FieldValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn encode_fields(document: &Document) -> Map<String, Value> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Request body for a document write
pub fn encode_document(document: &Document) -> Value {
    json!({ "fields": encode_fields(document) })
}

fn decode_value(value: &Value) -> Result<FieldValue, String> {
    let object = value
        .as_object()
        .ok_or_else(|| format!("expected a typed value, got {}", value))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| "empty typed value".to_string())?;

    match kind.as_str() {
        "nullValue" => Ok(FieldValue::Null),
        "booleanValue" => inner
            .as_bool()
            .map(FieldValue::Bool)
            .ok_or_else(|| format!("bad booleanValue {}", inner)),
        "integerValue" => match inner {
            Value::String(s) => s
                .parse()
                .map(FieldValue::Integer)
                .map_err(|e| format!("bad integerValue '{}': {}", s, e)),
            other => other
                .as_i64()
                .map(FieldValue::Integer)
                .ok_or_else(|| format!("bad integerValue {}", other)),
        },
        "doubleValue" => inner
            .as_f64()
            .map(FieldValue::Double)
            .ok_or_else(|| format!("bad doubleValue {}", inner)),
        "stringValue" | "referenceValue" => inner
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(|| format!("bad {} {}", kind, inner)),
        "timestampValue" => {
            let raw = inner
                .as_str()
                .ok_or_else(|| format!("bad timestampValue {}", inner))?;
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|e| format!("bad timestampValue '{}': {}", raw, e))
        }
        "arrayValue" => {
            let items = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                _ => Vec::new(),
            };
            Ok(FieldValue::Array(items))
        }
        "mapValue" => {
            let fields = match inner.get("fields") {
                Some(Value::Object(fields)) => decode_fields(fields)?,
                _ => Document::new(),
            };
            Ok(FieldValue::Map(fields))
        }
        other => Err(format!("unsupported value type '{}'", other)),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<Document, String> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// Decode a Firestore document resource; a document without fields is empty
pub fn decode_document(resource: &Value) -> Result<Document, String> {
    match resource.get("fields") {
        Some(Value::Object(fields)) => decode_fields(fields),
        _ => Ok(Document::new()),
    }
}

impl FirebaseBackend {
    fn document_url(&self, path: &str) -> Result<String, StoreError> {
        let encoded: Vec<String> = path_segments(path)?
            .into_iter()
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.firestore_endpoint,
            self.project_id,
            encoded.join("/")
        ))
    }
}

impl DocumentStore for FirebaseBackend {
    fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let url = self.document_url(path)?;
        let response = self.http.get(&url).bearer_auth(self.token()?).send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(rejection(response));
        }

        let resource: Value = response.json()?;
        decode_document(&resource)
            .map(Some)
            .map_err(|message| StoreError::InvalidDocument {
                path: path.to_string(),
                message,
            })
    }

    fn put(&self, path: &str, document: &Document) -> Result<(), StoreError> {
        let url = self.document_url(path)?;
        // PATCH without an update mask replaces the whole document
        let response = self
            .http
            .patch(&url)
            .bearer_auth(self.token()?)
            .json(&encode_document(document))
            .send()?;

        if !response.status().is_success() {
            return Err(rejection(response));
        }
        debug!("Wrote Firestore document {}", path);
        Ok(())
    }

    fn create_if_absent(&self, path: &str, document: &Document) -> Result<bool, StoreError> {
        let url = self.document_url(path)?;
        let response = self
            .http
            .patch(&url)
            .query(&[("currentDocument.exists", "false")])
            .bearer_auth(self.token()?)
            .json(&encode_document(document))
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == StatusCode::CONFLICT {
            return Ok(false);
        }

        let message = error_message(response);
        if status == StatusCode::BAD_REQUEST
            && (message.contains("FAILED_PRECONDITION") || message.contains("ALREADY_EXISTS"))
        {
            return Ok(false);
        }
        Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
