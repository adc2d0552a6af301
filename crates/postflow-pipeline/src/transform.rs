//! Mapping from a validated raw record to a storage-ready [`Document`]

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::TransformError;
use crate::models::{Document, RawRecord, ServerTimestamp, DOCUMENT_SOURCE, DOCUMENT_STATUS};

/// Transform a record using the current wall-clock time as `processed_at`.
///
/// Callers are expected to run [`validate`](crate::validate::validate)
/// first; unvalidated input is reported as a [`TransformError`] rather than
/// a panic.
pub fn transform(record: &RawRecord) -> Result<Document, TransformError> {
    transform_at(record, Utc::now())
}

/// Transform a record with an explicit `processed_at`.
pub fn transform_at(
    record: &RawRecord,
    processed_at: DateTime<Utc>,
) -> Result<Document, TransformError> {
    let object = record.as_object().ok_or(TransformError::InvalidType("<record>"))?;

    let user_id = integer_field(object, "userId")?;
    let post_id = integer_field(object, "id")?;
    let title = string_field(object, "title")?.trim().to_string();
    let body = string_field(object, "body")?.trim().to_string();

    Ok(Document {
        user_id,
        post_id,
        title_length: title.chars().count(),
        body_length: body.chars().count(),
        word_count: body.split_whitespace().count(),
        title,
        body,
        fetched_at: ServerTimestamp,
        processed_at,
        source: DOCUMENT_SOURCE.to_string(),
        status: DOCUMENT_STATUS.to_string(),
    })
}

fn field<'a>(object: &'a Map<String, Value>, name: &'static str) -> Result<&'a Value, TransformError> {
    object.get(name).ok_or(TransformError::MissingField(name))
}

fn integer_field(object: &Map<String, Value>, name: &'static str) -> Result<i64, TransformError> {
    match field(object, name)? {
        Value::Number(n) if n.is_i64() => n.as_i64().ok_or(TransformError::OutOfRange(name)),
        Value::Number(n) if n.is_u64() => Err(TransformError::OutOfRange(name)),
        _ => Err(TransformError::InvalidType(name)),
    }
}

fn string_field<'a>(
    object: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a str, TransformError> {
    field(object, name)?.as_str().ok_or(TransformError::InvalidType(name))
}
