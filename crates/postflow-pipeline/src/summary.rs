//! Run summaries returned to the caller and logged at the end of a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Stage;

/// Errors carried in a summary; the full list is only logged
pub const MAX_SUMMARY_ERRORS: usize = 10;

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Something was stored and nothing went wrong
    Success,
    /// Something was stored but some records were rejected
    Partial,
    /// Nothing was stored, or the run aborted
    Failed,
}

impl RunStatus {
    pub fn from_counts(stored: usize, errors: usize) -> Self {
        match (stored, errors) {
            (0, _) => RunStatus::Failed,
            (_, 0) => RunStatus::Success,
            _ => RunStatus::Partial,
        }
    }
}

/// Counts observed over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    /// Records returned by the source, before the processing cap
    pub fetched: usize,
    /// Documents produced by validation and transformation
    pub processed: usize,
    /// Documents committed to the store
    pub stored: usize,
}

/// Summary of a run that reached the end of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Wall-clock duration in seconds
    pub execution_time: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub items_fetched: usize,
    pub items_processed: usize,
    pub items_stored: usize,
    /// `stored / fetched * 100`, zero when nothing was fetched
    pub success_rate: f64,
    pub errors_count: usize,
    /// First [`MAX_SUMMARY_ERRORS`] error messages
    pub errors: Vec<String>,
    pub status: RunStatus,
}

impl ExecutionSummary {
    pub fn new(counts: RunCounts, errors: &[String], start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let success_rate = if counts.fetched > 0 {
            counts.stored as f64 / counts.fetched as f64 * 100.0
        } else {
            0.0
        };

        Self {
            execution_time: elapsed_secs(start_time, end_time),
            start_time,
            end_time,
            items_fetched: counts.fetched,
            items_processed: counts.processed,
            items_stored: counts.stored,
            success_rate,
            errors_count: errors.len(),
            errors: errors.iter().take(MAX_SUMMARY_ERRORS).cloned().collect(),
            status: RunStatus::from_counts(counts.stored, errors.len()),
        }
    }
}

/// Summary of a run aborted by a fatal error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Always [`RunStatus::Failed`]
    pub status: RunStatus,
    pub error: String,
    pub stage: Stage,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

impl FailureSummary {
    pub fn new(error: impl Into<String>, stage: Stage, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            status: RunStatus::Failed,
            error: error.into(),
            stage,
            execution_time: elapsed_secs(start_time, end_time),
            timestamp: end_time,
        }
    }
}

fn elapsed_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0)
}
