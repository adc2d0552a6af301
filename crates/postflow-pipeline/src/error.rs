//! Error types for the fetch / transform / store pipeline
//!
//! Each stage has its own error enum so the orchestrator can tell fatal
//! failures (fetch, store) from per-record ones (validation, transform)
//! without looking at message text.

use thiserror::Error;

/// Result type alias for a whole pipeline run
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure while pulling the page of records from the external API.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Rate limited. Retry after {retry_after} seconds")]
    RateLimited { retry_after: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Rate limits, transport errors, non-2xx statuses and undecodable bodies
    /// are transient. A URL or client that cannot be built never will be.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } => true,
            FetchError::Request(e) => !e.is_builder(),
            FetchError::InvalidUrl(_) => false,
        }
    }
}

/// Why a raw record was rejected by the validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field} type: expected {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("invalid or empty {0}")]
    EmptyField(&'static str),
}

impl ValidationError {
    /// Name of the field that caused the rejection, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::NotAnObject => None,
            ValidationError::MissingField(field)
            | ValidationError::EmptyField(field)
            | ValidationError::InvalidType { field, .. } => Some(field),
        }
    }
}

/// Failure mapping a raw record into a [`Document`](crate::models::Document).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("field {0} is missing")]
    MissingField(&'static str),

    #[error("field {0} has an unexpected type")]
    InvalidType(&'static str),

    #[error("field {0} is out of range")]
    OutOfRange(&'static str),
}

/// Failure talking to the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a chunked batch write.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Batch size must be at least 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("Batch {chunk}/{total_chunks} failed after {stored} documents were committed: {source}")]
    Commit {
        /// 1-based index of the chunk that failed
        chunk: usize,
        total_chunks: usize,
        /// Documents durably committed by earlier chunks
        stored: usize,
        #[source]
        source: StoreError,
    },
}

impl WriteError {
    /// Documents committed before the write aborted
    pub fn stored(&self) -> usize {
        match self {
            WriteError::InvalidBatchSize(_) => 0,
            WriteError::Commit { stored, .. } => *stored,
        }
    }
}

/// Fatal failure of one pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Store health check failed: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store write failed: {0}")]
    Write(#[from] WriteError),
}

impl PipelineError {
    /// The stage in which the run failed
    pub fn stage(&self) -> crate::models::Stage {
        use crate::models::Stage;
        match self {
            PipelineError::StoreUnavailable(_) => Stage::Preflight,
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Write(_) => Stage::Store,
        }
    }
}
