//! Document store abstraction
//!
//! The [`DocumentStore`] trait is the only way the pipeline touches storage.
//! Two backends are provided:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`FirestoreStore`](firestore::FirestoreStore) | Firestore REST API (or its emulator) |
//! | [`MemoryStore`](memory::MemoryStore) | In-process map for tests and dry runs |
//!
//! Implementations must be `Send + Sync` so one store can be shared by the
//! HTTP harness and every run it triggers.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::Document;

pub use firestore::{FirestoreOptions, FirestoreStore};
pub use memory::MemoryStore;

/// Collection written by the health check
pub const HEALTH_COLLECTION: &str = "_health_check";

/// Document id written by the health check
pub const HEALTH_DOCUMENT: &str = "status";

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert `documents` into `collection` as one atomic commit.
    ///
    /// Each document is stored under [`Document::key`], replacing any
    /// previous version in full. The store stamps `fetched_at` with its own
    /// commit time. Either every document in the call is written or none is.
    async fn commit_upserts(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError>;

    /// Write `_health_check/status` and read it back.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
