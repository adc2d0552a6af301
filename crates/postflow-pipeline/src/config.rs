//! Configuration management
//!
//! [`PipelineConfig`] is built once at process start and then shared
//! read-only (`Arc<PipelineConfig>`) by the pipeline, its collaborators and
//! the HTTP harness. Construction validates everything, so a value that
//! exists is a value that can be used.

use postflow_common::ConfigError;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default Firestore database id.
pub const DEFAULT_FIRESTORE_DATABASE: &str = "(default)";

/// Default collection receiving the processed documents.
pub const DEFAULT_FIRESTORE_COLLECTION: &str = "api_data";

/// Default base URL of the external API.
pub const DEFAULT_EXTERNAL_API_URL: &str = "https://jsonplaceholder.typicode.com";

/// Default path appended to the base URL.
pub const DEFAULT_API_ENDPOINT: &str = "/posts";

/// Default request timeout for the external API in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default number of fetch attempts.
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default wait before the second attempt, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: i64 = 2;

/// Default multiplier applied to the wait after each failed attempt.
pub const DEFAULT_RETRY_BACKOFF: f64 = 2.0;

/// Default cap on fetched records entering validation.
pub const DEFAULT_MAX_ITEMS_TO_PROCESS: usize = 10;

/// Default number of documents committed per store batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default HTTP harness bind host.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP harness port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub firestore: FirestoreConfig,
    pub api: ApiConfig,
    pub retry: RetryConfig,
    pub processing: ProcessingConfig,
    pub server: ServerConfig,
}

/// Document store settings
#[derive(Debug, Clone, Serialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub collection: String,
    /// `host:port` of a Firestore emulator; when set, plain HTTP is used
    pub emulator_host: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
}

/// External API settings
#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub endpoint: String,
    pub timeout_secs: u64,
}

/// Fetch retry settings
#[derive(Debug, Clone, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Zero or negative means retry without waiting
    pub delay_secs: i64,
    pub backoff: f64,
}

/// Record processing settings
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingConfig {
    pub max_items_to_process: usize,
    pub batch_size: usize,
}

/// HTTP harness settings
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl PipelineConfig {
    /// Load configuration from the process environment
    ///
    /// `.env` is not read here. The binary loads it once at startup, before
    /// logging is configured, so `LOG_*` and pipeline keys come from the same
    /// file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unset keys fall back to their `DEFAULT_*` constant. `PROJECT_ID` has no
    /// default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = PipelineConfig {
            firestore: FirestoreConfig {
                project_id: get("PROJECT_ID").ok_or(ConfigError::Missing("PROJECT_ID"))?,
                database: get("FIRESTORE_DATABASE")
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_DATABASE.to_string()),
                collection: get("FIRESTORE_COLLECTION")
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_COLLECTION.to_string()),
                emulator_host: get("FIRESTORE_EMULATOR_HOST"),
                access_token: get("FIRESTORE_ACCESS_TOKEN"),
            },
            api: ApiConfig {
                base_url: get("EXTERNAL_API_URL")
                    .unwrap_or_else(|| DEFAULT_EXTERNAL_API_URL.to_string()),
                endpoint: get("API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
                timeout_secs: parse_or("API_TIMEOUT", get("API_TIMEOUT"), DEFAULT_API_TIMEOUT_SECS)?,
            },
            retry: RetryConfig {
                max_attempts: parse_or(
                    "API_RETRY_MAX_ATTEMPTS",
                    get("API_RETRY_MAX_ATTEMPTS"),
                    DEFAULT_RETRY_MAX_ATTEMPTS,
                )?,
                delay_secs: parse_or(
                    "API_RETRY_DELAY",
                    get("API_RETRY_DELAY"),
                    DEFAULT_RETRY_DELAY_SECS,
                )?,
                backoff: parse_or(
                    "API_RETRY_BACKOFF",
                    get("API_RETRY_BACKOFF"),
                    DEFAULT_RETRY_BACKOFF,
                )?,
            },
            processing: ProcessingConfig {
                max_items_to_process: parse_or(
                    "MAX_ITEMS_TO_PROCESS",
                    get("MAX_ITEMS_TO_PROCESS"),
                    DEFAULT_MAX_ITEMS_TO_PROCESS,
                )?,
                batch_size: parse_or("BATCH_SIZE", get("BATCH_SIZE"), DEFAULT_BATCH_SIZE)?,
            },
            server: ServerConfig {
                host: get("HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port: parse_or("PORT", get("PORT"), DEFAULT_SERVER_PORT)?,
                shutdown_timeout_secs: parse_or(
                    "SHUTDOWN_TIMEOUT",
                    get("SHUTDOWN_TIMEOUT"),
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                )?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.firestore.project_id.is_empty() {
            return Err(ConfigError::Missing("PROJECT_ID"));
        }

        if self.firestore.collection.contains('/') {
            return Err(ConfigError::invalid(
                "FIRESTORE_COLLECTION",
                &self.firestore.collection,
                "collection id cannot contain '/'",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::invalid("API_TIMEOUT", "0", "timeout must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "API_RETRY_MAX_ATTEMPTS",
                "0",
                "at least one attempt is required",
            ));
        }

        if !self.retry.backoff.is_finite() || self.retry.backoff <= 0.0 {
            return Err(ConfigError::invalid(
                "API_RETRY_BACKOFF",
                self.retry.backoff.to_string(),
                "backoff factor must be a positive number",
            ));
        }

        if self.processing.batch_size == 0 {
            return Err(ConfigError::invalid("BATCH_SIZE", "0", "batch size must be at least 1"));
        }

        Ok(())
    }

    /// Full URL of the page to fetch
    pub fn api_url(&self) -> String {
        format!("{}{}", self.api.base_url.trim_end_matches('/'), self.api.endpoint)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Wait before the second fetch attempt; non-positive settings mean none
    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs.max(0).unsigned_abs())
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, value.clone(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_only_project_id() {
        let config = load(&[("PROJECT_ID", "demo-project")]).unwrap();

        assert_eq!(config.firestore.project_id, "demo-project");
        assert_eq!(config.firestore.database, DEFAULT_FIRESTORE_DATABASE);
        assert_eq!(config.firestore.collection, DEFAULT_FIRESTORE_COLLECTION);
        assert_eq!(config.api_url(), "https://jsonplaceholder.typicode.com/posts");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry_initial_delay(), Duration::from_secs(2));
        assert_eq!(config.retry.backoff, 2.0);
        assert_eq!(config.processing.max_items_to_process, 10);
        assert_eq!(config.processing.batch_size, 5);
        assert_eq!(config.api_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_project_id_is_fatal() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("PROJECT_ID"));
        assert_eq!(
            load(&[("PROJECT_ID", "   ")]).unwrap_err(),
            ConfigError::Missing("PROJECT_ID")
        );
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = load(&[
            ("PROJECT_ID", "p"),
            ("FIRESTORE_COLLECTION", "posts"),
            ("EXTERNAL_API_URL", "http://localhost:9999/"),
            ("API_RETRY_MAX_ATTEMPTS", "5"),
            ("API_RETRY_DELAY", "0"),
            ("MAX_ITEMS_TO_PROCESS", "25"),
            ("BATCH_SIZE", "2"),
            ("PORT", "9090"),
        ])
        .unwrap();

        assert_eq!(config.firestore.collection, "posts");
        assert_eq!(config.api_url(), "http://localhost:9999/posts");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry_initial_delay(), Duration::ZERO);
        assert_eq!(config.processing.max_items_to_process, 25);
        assert_eq!(config.processing.batch_size, 2);
        assert_eq!(config.server.port, 9090);
    }

    #[test]
    fn test_negative_delay_means_no_wait() {
        let config = load(&[("PROJECT_ID", "p"), ("API_RETRY_DELAY", "-3")]).unwrap();
        assert_eq!(config.retry_initial_delay(), Duration::ZERO);
    }

    #[test]
    fn test_unparseable_value_is_rejected() {
        let err = load(&[("PROJECT_ID", "p"), ("BATCH_SIZE", "five")]).unwrap_err();
        assert_eq!(err.key(), "BATCH_SIZE");
    }

    #[test]
    fn test_range_checks() {
        assert_eq!(
            load(&[("PROJECT_ID", "p"), ("API_RETRY_MAX_ATTEMPTS", "0")])
                .unwrap_err()
                .key(),
            "API_RETRY_MAX_ATTEMPTS"
        );
        assert_eq!(
            load(&[("PROJECT_ID", "p"), ("BATCH_SIZE", "0")]).unwrap_err().key(),
            "BATCH_SIZE"
        );
        assert_eq!(
            load(&[("PROJECT_ID", "p"), ("API_RETRY_BACKOFF", "-1.5")])
                .unwrap_err()
                .key(),
            "API_RETRY_BACKOFF"
        );
        assert_eq!(
            load(&[("PROJECT_ID", "p"), ("FIRESTORE_COLLECTION", "a/b")])
                .unwrap_err()
                .key(),
            "FIRESTORE_COLLECTION"
        );
    }

    #[test]
    fn test_access_token_not_serialized() {
        let config = load(&[("PROJECT_ID", "p"), ("FIRESTORE_ACCESS_TOKEN", "secret")]).unwrap();
        assert_eq!(config.firestore.access_token.as_deref(), Some("secret"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
