use super::{FormDataValue, RequestBody};
use crate::extract::file_summary;
use formwatch_common::FieldMap;
use serde_json::{Map, Value};
use thiserror::Error;

/// Google Forms bookkeeping keys that never carry answers.
const BOOKKEEPING_KEYS: [&str; 7] = [
    "fbzx",
    "pageHistory",
    "fvv",
    "partialResponse",
    "submissionTimestamp",
    "draftResponse",
    "dlut",
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BodyParseError {
    #[error("Opaque body (blob, stream or buffer)")]
    Opaque,

    #[error("Empty body")]
    Empty,

    #[error("Body is neither form data, a JSON object nor URL-encoded")]
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBody {
    pub fields: FieldMap,
    /// FormData, URL-encoded text, or a flat JSON object of scalars. Anything
    /// else (nested JSON, RPC envelopes) is unlikely to be a form post.
    pub form_shaped: bool,
}

/// Parse a request body as multipart form data, then JSON, then URL-encoded,
/// and clean the keys.
pub fn parse_body(body: &RequestBody) -> Result<ParsedBody, BodyParseError> {
    let (fields, form_shaped) = match body {
        RequestBody::FormData(entries) => (from_form_data(entries), true),
        RequestBody::Text(text) => parse_text(text)?,
        RequestBody::Opaque => return Err(BodyParseError::Opaque),
    };
    Ok(ParsedBody {
        fields: clean(fields),
        form_shaped,
    })
}

fn from_form_data(entries: &[(String, FormDataValue)]) -> FieldMap {
    let mut fields = FieldMap::new();
    let mut files: Vec<(String, usize)> = Vec::new();
    for (key, value) in entries {
        match value {
            FormDataValue::Text(text) => fields.push_value(key.as_str(), text.as_str()),
            FormDataValue::File { .. } => match files.iter_mut().find(|(k, _)| k == key) {
                Some((_, count)) => *count += 1,
                None => files.push((key.clone(), 1)),
            },
        }
    }
    for (key, count) in files {
        fields.insert(key, file_summary(count));
    }
    fields
}

fn parse_text(text: &str) -> Result<(FieldMap, bool), BodyParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(BodyParseError::Empty);
    }

    if trimmed.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            return Ok(from_json_object(&map));
        }
    }
    if trimmed.starts_with('[') && serde_json::from_str::<Value>(trimmed).is_ok() {
        return Err(BodyParseError::Unrecognized);
    }

    if !trimmed.contains('=') {
        return Err(BodyParseError::Unrecognized);
    }
    let mut fields = FieldMap::new();
    for (key, value) in url::form_urlencoded::parse(trimmed.as_bytes()) {
        fields.push_value(key.into_owned(), value.into_owned());
    }
    Ok((fields, true))
}

/// Top-level scalars and arrays of scalars become fields; nested objects
/// make the body not form-shaped.
fn from_json_object(map: &Map<String, Value>) -> (FieldMap, bool) {
    let mut fields = FieldMap::new();
    let mut flat = true;
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items {
                    match scalar(item) {
                        Some(text) => fields.push_value(key.as_str(), text),
                        None => flat = false,
                    }
                }
            }
            Value::Null => {}
            other => match scalar(other) {
                Some(text) => fields.insert(key.as_str(), text),
                None => flat = false,
            },
        }
    }
    (fields, flat)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Drop password-like, sentinel and bookkeeping keys; normalize
/// `entry.<id>` to `<id>`.
fn clean(fields: FieldMap) -> FieldMap {
    let mut cleaned = FieldMap::new();
    for (key, value) in fields.iter() {
        if key.to_lowercase().contains("password")
            || key.ends_with("_sentinel")
            || BOOKKEEPING_KEYS.contains(&key)
        {
            continue;
        }
        let key = key.strip_prefix("entry.").unwrap_or(key).to_string();
        if cleaned.contains_key(&key) {
            for v in value.values() {
                cleaned.push_value(key.as_str(), v);
            }
        } else {
            cleaned.insert(key, value.clone());
        }
    }
    cleaned
}
