//! Postflow pipeline
//!
//! A scheduled batch job that fetches a bounded page of posts from an HTTP
//! API, validates and transforms each record, and upserts the results into a
//! Firestore collection in fixed-size atomic batches.
//!
//! # Overview
//!
//! - **Backoff**: bounded retry with exponential delay around the fetch ([`backoff`])
//! - **Validation and transformation**: per-record, non-fatal ([`validate`], [`transform`])
//! - **Batch writing**: chunked, fail-fast commits ([`writer`])
//! - **Orchestration**: stages, error accounting, summaries ([`pipeline`], [`summary`])
//! - **Harness**: invocation handlers, HTTP server and CLI ([`handler`], [`server`])

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod backoff;
pub mod config;
pub mod error;
pub mod fetch;
pub mod handler;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod store;
pub mod summary;
pub mod transform;
pub mod validate;
pub mod writer;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use models::{Document, RawRecord};
pub use pipeline::{Pipeline, PipelineFailure};
pub use summary::{ExecutionSummary, FailureSummary, RunStatus};

use clap::{Parser, Subcommand};

/// Postflow - fetch, transform and store posts
#[derive(Parser, Debug)]
#[command(name = "postflow")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use the in-process store instead of Firestore
    #[arg(long, env = "POSTFLOW_MEMORY_STORE", global = true)]
    pub memory_store: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Execute one pipeline run and print its summary as JSON
    Run,

    /// Serve the pipeline over HTTP
    Serve,

    /// Check store reachability and print the report as JSON
    Health,
}
