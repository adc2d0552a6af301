//! Chunked, fail-fast batch writer
//!
//! Documents are split into consecutive chunks of at most `batch_size` and
//! committed in order, one store commit per chunk. The first failed commit
//! aborts the write; chunks committed before it stay committed and later
//! chunks are never attempted.

use tracing::{error, info, warn};

use crate::error::WriteError;
use crate::models::Document;
use crate::store::DocumentStore;

/// Writes documents to one collection of a [`DocumentStore`]
pub struct BatchWriter<'a> {
    store: &'a dyn DocumentStore,
    collection: &'a str,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore, collection: &'a str) -> Self {
        Self { store, collection }
    }

    /// Commit `documents` in chunks and return how many were stored.
    ///
    /// An empty slice returns `Ok(0)` without contacting the store.
    pub async fn write_all(&self, documents: &[Document], batch_size: usize) -> Result<usize, WriteError> {
        if documents.is_empty() {
            warn!("No items to store in {}", self.collection);
            return Ok(0);
        }

        if batch_size == 0 {
            return Err(WriteError::InvalidBatchSize(batch_size));
        }

        let total_chunks = documents.len().div_ceil(batch_size);
        let mut stored = 0;

        info!(
            "Storing {} items in collection {} ({} batches)",
            documents.len(),
            self.collection,
            total_chunks
        );

        for (chunk_idx, chunk) in documents.chunks(batch_size).enumerate() {
            if let Err(source) = self.store.commit_upserts(self.collection, chunk).await {
                error!(
                    chunk = chunk_idx + 1,
                    total_chunks,
                    stored,
                    error = %source,
                    "Batch write failed"
                );
                return Err(WriteError::Commit {
                    chunk: chunk_idx + 1,
                    total_chunks,
                    stored,
                    source,
                });
            }

            stored += chunk.len();
            info!(
                "Batch write successful: chunk {} / {} ({} items)",
                chunk_idx + 1,
                total_chunks,
                chunk.len()
            );
        }

        Ok(stored)
    }
}
