//! Invocation entry points
//!
//! Both functions return a `(payload, status)` pair and know nothing about
//! the transport; the HTTP harness and the CLI wrap them.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::pipeline::Pipeline;
use crate::store::DocumentStore;
use crate::summary::{ExecutionSummary, FailureSummary};

/// Version reported by the health check
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Payload of a run invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunResponse {
    Completed(ExecutionSummary),
    Failed(FailureSummary),
}

/// Run the pipeline once.
///
/// Any run that reaches SUMMARIZE answers 200, including `partial` and
/// `failed` summaries; a fatal error answers 500.
pub async fn invoke(pipeline: &Pipeline) -> (RunResponse, StatusCode) {
    match pipeline.run().await {
        Ok(summary) => {
            info!("Execution summary: {}", serde_json::to_string(&summary).unwrap_or_default());
            (RunResponse::Completed(summary), StatusCode::OK)
        },
        Err(failure) => (RunResponse::Failed(failure.summary), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreConnection {
    Connected,
    Disconnected,
}

/// Payload of a health invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub firestore: StoreConnection,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Check store reachability: 200 when healthy, 503 otherwise
pub async fn health(store: &dyn DocumentStore) -> (HealthReport, StatusCode) {
    let result = store.health_check().await;
    let timestamp = Utc::now();

    match result {
        Ok(()) => (
            HealthReport {
                status: HealthStatus::Healthy,
                firestore: StoreConnection::Connected,
                timestamp,
                version: VERSION.to_string(),
                error: None,
            },
            StatusCode::OK,
        ),
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                HealthReport {
                    status: HealthStatus::Unhealthy,
                    firestore: StoreConnection::Disconnected,
                    timestamp,
                    version: VERSION.to_string(),
                    error: Some(e.to_string()),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            )
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_health_reports_connected_store() {
        let store = MemoryStore::new();
        let (report, status) = health(&store).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.firestore, StoreConnection::Connected);
        assert_eq!(report.version, VERSION);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["firestore"], "connected");
        assert!(value.get("error").is_none());
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_store() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let (report, status) = health(&store).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.firestore, StoreConnection::Disconnected);
        assert!(report.error.unwrap().contains("offline"));
    }
}
