//! In-memory [`DocumentStore`] for tests and dry runs.
//!
//! Collections are `BTreeMap`s behind a `std::sync::RwLock`, so listings come
//! back in key order. Commits are applied under a single write lock, which
//! makes each call atomic. Failures can be injected to exercise the
//! pipeline's error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{DocumentStore, HEALTH_COLLECTION, HEALTH_DOCUMENT};
use crate::error::StoreError;
use crate::models::Document;

/// A document as persisted, with the commit time resolved
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub document: Document,
    pub fetched_at: DateTime<Utc>,
}

type Collection = BTreeMap<String, StoredDocument>;

/// In-process document store.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
    commit_attempts: AtomicUsize,
    commits: AtomicUsize,
    /// 1-based commit attempt that fails; zero disables injection
    fail_on_attempt: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th commit attempt (1-based) fail without writing anything
    pub fn fail_on_commit(&self, n: usize) {
        self.fail_on_attempt.store(n, Ordering::SeqCst);
    }

    /// Make every operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful commits
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of commit calls, successful or not
    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    /// Look up one stored document
    pub fn get(&self, collection: &str, key: &str) -> Option<StoredDocument> {
        self.collections
            .read()
            .ok()?
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned()
    }

    /// Keys stored in `collection`, in order
    pub fn keys(&self, collection: &str) -> Vec<String> {
        self.collections
            .read()
            .map(|all| all.get(collection).map(|docs| docs.keys().cloned().collect()))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.keys(collection).len()
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Commit time of the most recent successful health check
    pub fn last_health_check(&self) -> Option<DateTime<Utc>> {
        self.last_health_check.read().ok().and_then(|guard| *guard)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn commit_upserts(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError> {
        let attempt = self.commit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.ensure_available()?;

        if self.fail_on_attempt.load(Ordering::SeqCst) == attempt {
            return Err(StoreError::Unavailable(format!("injected failure on commit {}", attempt)));
        }

        let now = Utc::now();
        let mut all = self.collections.write().map_err(poisoned)?;
        let docs = all.entry(collection.to_string()).or_default();
        for document in documents {
            docs.insert(
                document.key(),
                StoredDocument {
                    document: document.clone(),
                    fetched_at: now,
                },
            );
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.ensure_available()?;

        *self.last_health_check.write().map_err(poisoned)? = Some(Utc::now());

        match self.last_health_check() {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("{}/{}", HEALTH_COLLECTION, HEALTH_DOCUMENT))),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
