//! Error types shared across Postflow crates

use thiserror::Error;

/// A setting that is required but absent, or present but unusable.
///
/// Raised while the immutable configuration is being constructed, before any
/// network or store traffic happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The configuration key this error refers to
    pub fn key(&self) -> &'static str {
        match self {
            ConfigError::Missing(key) => key,
            ConfigError::Invalid { key, .. } => key,
        }
    }
}
