//! intake - artifact intake and query console for security labs.

mod cli;

use cli::{Cli, Command};
use lab_intake::config::Config;
use lab_intake::error::{IntakeError, Result};
use lab_intake::logging;
use lab_intake::pipeline::{Pipeline, UploadRequest};
use serde::Serialize;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    match &cli.log_file {
        Some(path) => logging::init_file_logging(path),
        None => logging::init_stderr_logging(),
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    config.apply_env_overrides();
    config.validate()?;

    let principal = cli.principal();
    let pipeline = Pipeline::open(&config).await?;

    let outcome = match cli.command {
        Command::Upload { file, name } => {
            let bytes = tokio::fs::read(&file).await.map_err(|e| {
                IntakeError::io(format!("Failed to read {}: {e}", file.display()))
            })?;
            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let result = pipeline
                .upload(principal.as_ref(), UploadRequest::new(name, bytes))
                .await;
            result.and_then(|r| print_json(&r))
        }
        Command::Query { sql } => pipeline
            .query(principal.as_ref(), &sql)
            .await
            .and_then(|r| print_json(&r)),
        Command::List => pipeline
            .list_artifacts(principal.as_ref())
            .await
            .and_then(|r| print_json(&r)),
        Command::History { limit } => pipeline
            .query_history(principal.as_ref(), limit)
            .await
            .and_then(|r| print_json(&r)),
        Command::Seed { file } => {
            let script = tokio::fs::read_to_string(&file).await.map_err(|e| {
                IntakeError::io(format!("Failed to read {}: {e}", file.display()))
            })?;
            pipeline
                .seed_console(principal.as_ref(), &script)
                .await
                .and_then(|affected| print_json(&serde_json::json!({ "rows_affected": affected })))
        }
    };

    pipeline.close().await?;
    outcome
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| IntakeError::internal(format!("Failed to serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}
