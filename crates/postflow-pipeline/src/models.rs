//! Data model shared by every pipeline stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One element of the API response body, exactly as fetched.
///
/// Kept as an untyped JSON value so the validator can report precisely which
/// field is missing or mistyped instead of failing the whole page decode.
pub type RawRecord = serde_json::Value;

/// Value of [`Document::source`] for every document this job writes
pub const DOCUMENT_SOURCE: &str = "jsonplaceholder";

/// Value of [`Document::status`] for every document this job writes
pub const DOCUMENT_STATUS: &str = "processed";

/// Prefix of the deterministic storage key
pub const DOCUMENT_KEY_PREFIX: &str = "post_";

/// Name of the field that the store stamps with its own clock
pub const FETCHED_AT_FIELD: &str = "fetched_at";

/// Marker for a timestamp resolved by the store at commit time.
///
/// It carries no value on the client. Store implementations see it and write
/// their own commit time into [`FETCHED_AT_FIELD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerTimestamp;

/// Storage-ready document derived from one valid [`RawRecord`].
///
/// Lengths and the word count are always computed from the trimmed `title`
/// and `body` held in the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub user_id: i64,
    pub post_id: i64,
    pub title: String,
    pub body: String,
    pub title_length: usize,
    pub body_length: usize,
    pub word_count: usize,
    #[serde(skip)]
    pub fetched_at: ServerTimestamp,
    pub processed_at: DateTime<Utc>,
    pub source: String,
    pub status: String,
}

impl Document {
    /// Deterministic storage key, `post_{post_id}`
    pub fn key(&self) -> String {
        format!("{}{}", DOCUMENT_KEY_PREFIX, self.post_id)
    }
}

/// Stages of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Store reachability check before any record is fetched
    Preflight,
    Fetch,
    ValidateTransform,
    Store,
    Summarize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Preflight => "preflight",
            Stage::Fetch => "fetch",
            Stage::ValidateTransform => "validate_transform",
            Stage::Store => "store",
            Stage::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
