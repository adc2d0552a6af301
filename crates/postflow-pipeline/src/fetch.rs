//! Record source: one page of raw records per call
//!
//! The pipeline depends on the [`RecordSource`] trait only. The production
//! implementation, [`HttpRecordSource`], issues a single GET against the
//! configured endpoint and expects a JSON array in response.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::models::RawRecord;

/// User agent sent with every request to the external API.
pub const USER_AGENT: &str = "postflow-pipeline/1.0";

/// Retry-After value reported when a 429 carries no such header.
pub const DEFAULT_RETRY_AFTER: &str = "60";

/// Anything that can produce one page of raw records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch a single page. One call is one attempt; retrying is the caller's job.
    async fn fetch_page(&self) -> Result<Vec<RawRecord>, FetchError>;

    /// Human-readable location of the source, used in logs
    fn describe(&self) -> &str;
}

/// HTTP JSON source
pub struct HttpRecordSource {
    client: Client,
    url: String,
}

impl HttpRecordSource {
    /// Create a source for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        reqwest::Url::parse(&url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, url })
    }

    /// Create from the pipeline configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FetchError> {
        Self::new(config.api_url(), config.api_timeout())
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_page(&self) -> Result<Vec<RawRecord>, FetchError> {
        info!("Fetching data from: {}", self.url);

        let response = self.client.get(&self.url).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER)
                .to_string();
            return Err(FetchError::RateLimited { retry_after });
        }

        let records: Vec<RawRecord> = response.error_for_status()?.json().await?;

        debug!(count = records.len(), "Decoded response body");

        Ok(records)
    }

    fn describe(&self) -> &str {
        &self.url
    }
}
