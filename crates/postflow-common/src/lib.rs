//! Postflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared configuration errors and logging setup for the Postflow workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`ConfigError`] for settings that are missing or malformed
//! - **Logging**: [`logging::init_logging`] installs the process-wide `tracing` subscriber
//!
//! # Example
//!
//! ```no_run
//! use postflow_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     tracing::info!("Job starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
