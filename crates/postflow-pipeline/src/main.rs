//! Postflow - Main entry point

use anyhow::Context;
use clap::Parser;
use postflow_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use postflow_pipeline::fetch::HttpRecordSource;
use postflow_pipeline::server::{self, AppState};
use postflow_pipeline::store::{DocumentStore, FirestoreStore, MemoryStore};
use postflow_pipeline::{handler, Cli, Commands, Pipeline, PipelineConfig};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env must be loaded before logging reads LOG_*
    dotenvy::dotenv().ok();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("postflow")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid logging configuration: {:#}", e);
            return ExitCode::from(2);
        },
    };

    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            return ExitCode::from(2);
        },
    };

    match execute_command(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config = Arc::new(PipelineConfig::from_env().context("Failed to load configuration")?);
    info!(
        project_id = %config.firestore.project_id,
        collection = %config.firestore.collection,
        "Configuration loaded"
    );

    let store: Arc<dyn DocumentStore> = if cli.memory_store {
        info!("Using in-memory document store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FirestoreStore::from_config(&config).context("Failed to create Firestore client")?)
    };

    match cli.command {
        Commands::Health => {
            let (report, status) = handler::health(store.as_ref()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(exit_code(status.is_success()))
        },
        Commands::Run => {
            let pipeline = build_pipeline(config, store)?;
            let (response, status) = handler::invoke(&pipeline).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(exit_code(status.is_success()))
        },
        Commands::Serve => {
            let pipeline = build_pipeline(config, store)?;
            server::serve(AppState::new(Arc::new(pipeline))).await?;
            Ok(ExitCode::SUCCESS)
        },
    }
}

fn build_pipeline(config: Arc<PipelineConfig>, store: Arc<dyn DocumentStore>) -> anyhow::Result<Pipeline> {
    let source = HttpRecordSource::from_config(&config).context("Failed to create HTTP client")?;
    Ok(Pipeline::new(config, Arc::new(source), store)?)
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
