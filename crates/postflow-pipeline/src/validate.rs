//! Structural validation of raw API records
//!
//! Rules run in a fixed order and stop at the first failure, so the reported
//! reason always names the earliest offending field:
//!
//! 1. `userId`, `id`, `title` and `body` are all present
//! 2. `userId` and `id` are JSON integers (no booleans, floats or numeric strings)
//! 3. `title` is a string that is non-empty after trimming
//! 4. `body` is a string that is non-empty after trimming

use serde_json::Value;
use tracing::warn;

use crate::error::ValidationError;
use crate::models::RawRecord;

/// Keys every record must carry, in the order they are checked
pub const REQUIRED_FIELDS: [&str; 4] = ["userId", "id", "title", "body"];

/// Check one record, returning the first rule it breaks.
pub fn validate(record: &RawRecord) -> Result<(), ValidationError> {
    let result = check(record);

    if let Err(ref reason) = result {
        warn!(field = reason.field().unwrap_or("<record>"), %reason, "Record failed validation");
    }

    result
}

/// Predicate form of [`validate`]
pub fn is_valid(record: &RawRecord) -> bool {
    validate(record).is_ok()
}

fn check(record: &RawRecord) -> Result<(), ValidationError> {
    let object = record.as_object().ok_or(ValidationError::NotAnObject)?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(ValidationError::MissingField(field));
        }
    }

    for field in ["userId", "id"] {
        if !is_integer(&object[field]) {
            return Err(ValidationError::InvalidType {
                field,
                expected: "integer",
            });
        }
    }

    for field in ["title", "body"] {
        match object[field].as_str() {
            Some(text) if !text.trim().is_empty() => {},
            _ => return Err(ValidationError::EmptyField(field)),
        }
    }

    Ok(())
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}
