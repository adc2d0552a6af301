//! Pipeline orchestrator
//!
//! One [`Pipeline::run`] walks the stages in order:
//!
//! ```text
//! PREFLIGHT -> FETCH -> VALIDATE_TRANSFORM -> STORE -> SUMMARIZE
//! ```
//!
//! Preflight, fetch and store failures end the run with a
//! [`FailureSummary`]. Per-record failures in VALIDATE_TRANSFORM never escape
//! the stage; they are collected and reported in the [`ExecutionSummary`].

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::PipelineConfig;
use crate::error::{FetchError, PipelineError, Result, TransformError, ValidationError};
use crate::fetch::RecordSource;
use crate::models::{Document, RawRecord, Stage};
use crate::store::DocumentStore;
use crate::summary::{ExecutionSummary, FailureSummary, RunCounts};
use crate::transform::transform;
use crate::validate::validate;
use crate::writer::BatchWriter;
use postflow_common::ConfigError;

/// Why one record was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemErrorKind {
    Validation(ValidationError),
    Transform(TransformError),
}

/// A dropped record and its 1-based position in the processed slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    pub index: usize,
    pub kind: ItemErrorKind,
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ItemErrorKind::Validation(e) => write!(f, "Item {}: Validation failed - {}", self.index, e),
            ItemErrorKind::Transform(e) => write!(f, "Item {}: Processing error - {}", self.index, e),
        }
    }
}

/// Result of the validate/transform stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    /// Documents in the order of their source records
    pub documents: Vec<Document>,
    pub errors: Vec<ItemError>,
}

/// Validate and transform the first `limit` records.
///
/// Records past `limit` are ignored entirely. Each record either yields one
/// document or one [`ItemError`].
pub fn process_records(records: &[RawRecord], limit: usize) -> ProcessOutcome {
    let items = &records[..records.len().min(limit)];
    info!("Processing {} items", items.len());

    let mut outcome = ProcessOutcome::default();

    for (idx, record) in items.iter().enumerate() {
        let index = idx + 1;

        if let Err(e) = validate(record) {
            warn!("Skipping item {}: validation failed", index);
            outcome.errors.push(ItemError {
                index,
                kind: ItemErrorKind::Validation(e),
            });
            continue;
        }

        match transform(record) {
            Ok(document) => {
                debug!("Item {}: Processed successfully", index);
                outcome.documents.push(document);
            },
            Err(e) => {
                let item_error = ItemError {
                    index,
                    kind: ItemErrorKind::Transform(e),
                };
                error!("{}", item_error);
                outcome.errors.push(item_error);
            },
        }
    }

    info!(
        "Processed {} items successfully, {} errors",
        outcome.documents.len(),
        outcome.errors.len()
    );

    outcome
}

/// A run that ended in a fatal error, with the summary to hand back
#[derive(Error, Debug)]
#[error("{error}")]
pub struct PipelineFailure {
    #[source]
    pub error: PipelineError,
    pub summary: FailureSummary,
}

/// Fetch-transform-store job over shared collaborators
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    source: Arc<dyn RecordSource>,
    store: Arc<dyn DocumentStore>,
    backoff: Backoff,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Arc<dyn RecordSource>,
        store: Arc<dyn DocumentStore>,
    ) -> std::result::Result<Self, ConfigError> {
        let backoff = Backoff::new(
            config.retry.max_attempts,
            config.retry_initial_delay(),
            config.retry.backoff,
        )?;

        Ok(Self {
            config,
            source,
            store,
            backoff,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Execute one full run.
    pub async fn run(&self) -> std::result::Result<ExecutionSummary, PipelineFailure> {
        let start_time = Utc::now();

        info!("Pipeline execution started");
        info!(
            "Configuration: {}",
            serde_json::to_string(self.config.as_ref()).unwrap_or_default()
        );

        match self.execute(start_time).await {
            Ok(summary) => {
                info!(
                    status = ?summary.status,
                    items_fetched = summary.items_fetched,
                    items_stored = summary.items_stored,
                    errors_count = summary.errors_count,
                    "Pipeline execution completed in {:.3}s",
                    summary.execution_time
                );
                Ok(summary)
            },
            Err(error) => {
                let summary = FailureSummary::new(error.to_string(), error.stage(), start_time, Utc::now());
                if let PipelineError::Write(ref write) = error {
                    error!(stage = %summary.stage, stored = write.stored(), "Pipeline execution failed: {}", error);
                } else {
                    error!(stage = %summary.stage, "Pipeline execution failed: {}", error);
                }
                Err(PipelineFailure { error, summary })
            },
        }
    }

    async fn execute(&self, start_time: DateTime<Utc>) -> Result<ExecutionSummary> {
        info!(stage = %Stage::Preflight, "Step 1/4: Checking {} store health", self.store.name());
        self.store
            .health_check()
            .await
            .map_err(PipelineError::StoreUnavailable)?;

        info!(stage = %Stage::Fetch, "Step 2/4: Fetching data from {}", self.source.describe());
        let records = self
            .backoff
            .execute(|| self.source.fetch_page(), FetchError::is_retryable)
            .await?;
        info!("Successfully fetched {} items from API", records.len());

        info!(stage = %Stage::ValidateTransform, "Step 3/4: Processing and validating data");
        let outcome = process_records(&records, self.config.processing.max_items_to_process);
        let errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();
        if !errors.is_empty() {
            warn!("Processing errors: {:?}", errors);
        }

        info!(stage = %Stage::Store, "Step 4/4: Storing data in {}", self.config.firestore.collection);
        let stored = BatchWriter::new(self.store.as_ref(), &self.config.firestore.collection)
            .write_all(&outcome.documents, self.config.processing.batch_size)
            .await?;
        info!("Successfully stored {} items", stored);

        debug!(stage = %Stage::Summarize, "Building execution summary");
        let counts = RunCounts {
            fetched: records.len(),
            processed: outcome.documents.len(),
            stored,
        };

        Ok(ExecutionSummary::new(counts, &errors, start_time, Utc::now()))
    }
}
