//! Firestore [`DocumentStore`] over the REST API
//!
//! Every [`commit_upserts`](DocumentStore::commit_upserts) call becomes one
//! `documents:commit` request, which Firestore applies atomically. Each
//! document is an `update` write carrying the full field set plus a
//! `fetched_at <- REQUEST_TIME` field transform, so the timestamp comes from
//! the server clock.
//!
//! When `FIRESTORE_EMULATOR_HOST` is set the store talks plain HTTP to the
//! emulator; otherwise it targets `firestore.googleapis.com` with the bearer
//! token from `FIRESTORE_ACCESS_TOKEN`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{DocumentStore, HEALTH_COLLECTION, HEALTH_DOCUMENT};
use crate::config::PipelineConfig;
use crate::error::StoreError;
use crate::models::{Document, FETCHED_AT_FIELD};

/// Production endpoint of the Firestore REST API
pub const FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";

/// Per-request timeout for store calls in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`FirestoreStore`]
#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    /// API root, e.g. `https://firestore.googleapis.com/v1`
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl FirestoreOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let base_url = match &config.firestore.emulator_host {
            Some(host) => format!("http://{}/v1", host.trim_end_matches('/')),
            None => FIRESTORE_API_URL.to_string(),
        };

        Self {
            base_url,
            project_id: config.firestore.project_id.clone(),
            database: config.firestore.database.clone(),
            access_token: config.firestore.access_token.clone(),
            timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

/// Firestore REST client
pub struct FirestoreStore {
    client: Client,
    options: FirestoreOptions,
}

impl FirestoreStore {
    pub fn new(options: FirestoreOptions) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self { client, options })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, StoreError> {
        Self::new(FirestoreOptions::from_config(config))
    }

    /// `projects/{project}/databases/{database}/documents`
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.options.project_id, self.options.database
        )
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents:commit",
            self.options.base_url.trim_end_matches('/'),
            self.options.project_id,
            self.options.database
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.options.base_url.trim_end_matches('/'),
            self.document_name(collection, id)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.options.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn commit(&self, writes: Vec<Value>) -> Result<(), StoreError> {
        let count = writes.len();
        let response = self
            .authorize(self.client.post(self.commit_url()))
            .json(&json!({ "writes": writes }))
            .send()
            .await?;

        check_status(response).await?;
        debug!(writes = count, "Commit accepted");
        Ok(())
    }

    fn upsert_write(&self, name: String, fields: Map<String, Value>, stamp_field: &str) -> Value {
        json!({
            "update": { "name": name, "fields": fields },
            "updateTransforms": [
                { "fieldPath": stamp_field, "setToServerValue": "REQUEST_TIME" }
            ]
        })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn commit_upserts(&self, collection: &str, documents: &[Document]) -> Result<(), StoreError> {
        let writes = documents
            .iter()
            .map(|doc| {
                self.upsert_write(
                    self.document_name(collection, &doc.key()),
                    encode_document(doc),
                    FETCHED_AT_FIELD,
                )
            })
            .collect();

        self.commit(writes).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("status".to_string(), string_value("healthy"));
        let write = self.upsert_write(
            self.document_name(HEALTH_COLLECTION, HEALTH_DOCUMENT),
            fields,
            "last_check",
        );

        if let Err(e) = self.commit(vec![write]).await {
            error!("Firestore health check failed: {}", e);
            return Err(e);
        }

        let response = self
            .authorize(self.client.get(self.document_url(HEALTH_COLLECTION, HEALTH_DOCUMENT)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            error!("Firestore health check failed: document not found");
            return Err(StoreError::NotFound(format!("{}/{}", HEALTH_COLLECTION, HEALTH_DOCUMENT)));
        }

        check_status(response).await?;
        info!("Firestore health check passed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "firestore"
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(StoreError::Unavailable(body));
    }

    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

fn integer_value(n: i64) -> Value {
    // Firestore's JSON mapping carries int64 as a decimal string
    json!({ "integerValue": n.to_string() })
}

fn string_value(s: &str) -> Value {
    json!({ "stringValue": s })
}

/// Firestore field map for one document, excluding the server-stamped field
pub fn encode_document(doc: &Document) -> Map<String, Value> {
    let count = |n: usize| integer_value(i64::try_from(n).unwrap_or(i64::MAX));

    let mut fields = Map::new();
    fields.insert("user_id".to_string(), integer_value(doc.user_id));
    fields.insert("post_id".to_string(), integer_value(doc.post_id));
    fields.insert("title".to_string(), string_value(&doc.title));
    fields.insert("body".to_string(), string_value(&doc.body));
    fields.insert("title_length".to_string(), count(doc.title_length));
    fields.insert("body_length".to_string(), count(doc.body_length));
    fields.insert("word_count".to_string(), count(doc.word_count));
    fields.insert(
        "processed_at".to_string(),
        json!({ "timestampValue": doc.processed_at.to_rfc3339() }),
    );
    fields.insert("source".to_string(), string_value(&doc.source));
    fields.insert("status".to_string(), string_value(&doc.status));
    fields
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{ServerTimestamp, DOCUMENT_SOURCE, DOCUMENT_STATUS};
    use chrono::{TimeZone, Utc};
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const COMMIT_PATH: &str = "/v1/projects/demo/databases/(default)/documents:commit";
    const HEALTH_PATH: &str = "/v1/projects/demo/databases/(default)/documents/_health_check/status";

    fn store_for(server: &MockServer, token: Option<&str>) -> FirestoreStore {
        FirestoreStore::new(FirestoreOptions {
            base_url: format!("{}/v1", server.uri()),
            project_id: "demo".to_string(),
            database: "(default)".to_string(),
            access_token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn doc(post_id: i64) -> Document {
        Document {
            user_id: 3,
            post_id,
            title: "A".to_string(),
            body: "hello world".to_string(),
            title_length: 1,
            body_length: 11,
            word_count: 2,
            fetched_at: ServerTimestamp,
            processed_at: Utc.with_ymd_and_hms(2026, 10, 14, 6, 0, 0).unwrap(),
            source: DOCUMENT_SOURCE.to_string(),
            status: DOCUMENT_STATUS.to_string(),
        }
    }

    #[test]
    fn test_encode_document_fields() {
        let fields = encode_document(&doc(7));
        assert_eq!(fields["post_id"], json!({"integerValue": "7"}));
        assert_eq!(fields["title"], json!({"stringValue": "A"}));
        assert_eq!(fields["word_count"], json!({"integerValue": "2"}));
        assert_eq!(
            fields["processed_at"],
            json!({"timestampValue": "2026-10-14T06:00:00+00:00"})
        );
        assert!(!fields.contains_key(FETCHED_AT_FIELD));
    }

    #[test]
    fn test_options_prefer_emulator() {
        let mut config = crate::config::PipelineConfig::from_lookup(|key| match key {
            "PROJECT_ID" => Some("demo".to_string()),
            "FIRESTORE_EMULATOR_HOST" => Some("localhost:8681".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(FirestoreOptions::from_config(&config).base_url, "http://localhost:8681/v1");

        config.firestore.emulator_host = None;
        assert_eq!(FirestoreOptions::from_config(&config).base_url, FIRESTORE_API_URL);
    }

    #[tokio::test]
    async fn test_commit_sends_one_write_per_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"writeResults": []})))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, Some("owner"));
        store.commit_upserts("api_data", &[doc(1), doc(2)]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        let writes = body["writes"].as_array().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(
            writes[1]["update"]["name"],
            "projects/demo/databases/(default)/documents/api_data/post_2"
        );
        assert_eq!(writes[0]["updateTransforms"][0]["fieldPath"], "fetched_at");
        assert_eq!(writes[0]["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
    }

    #[tokio::test]
    async fn test_commit_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
            .mount(&server)
            .await;

        let err = store_for(&server, None).commit_upserts("api_data", &[doc(1)]).await.unwrap_err();
        match err {
            StoreError::Rejected { status, body } => {
                assert_eq!(status, 403);
                assert_eq!(body, "permission denied");
            },
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_health_check_writes_then_reads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(HEALTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/_health_check/status",
                "fields": {"status": {"stringValue": "healthy"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server, None).health_check().await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["writes"][0]["updateTransforms"][0]["fieldPath"], "last_check");
    }

    #[tokio::test]
    async fn test_health_check_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMMIT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(HEALTH_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = store_for(&server, None).health_check().await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend offline"))
            .mount(&server)
            .await;

        let err = store_for(&server, None).health_check().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(ref body) if body == "backend offline"));
    }
}
