//! Database backup job
//!
//! Runs once per invocation; schedule it with cron, a systemd timer or a
//! Kubernetes CronJob.

// dbarchiver/src/main.rs
use std::process::ExitCode;

use anyhow::{Context, Result};
use dbarchiver::utils::logging::{LogFormat, init_logging};
use dbarchiver::{RunFailure, RunStage, Settings, run_backup_flow};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is the normal case outside local development.
    let dotenv_loaded = dotenv::dotenv().ok();
    init_logging(LogFormat::from_env());
    if let Some(path) = dotenv_loaded {
        info!("Loaded environment from {}", path.display());
    }

    match run_app().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let settings = Settings::from_env()
        .map_err(|e| RunFailure::new(RunStage::LoadSettings, e))
        .context("Failed to load settings from the environment")?;

    let report = run_backup_flow(&settings).await?;

    let summary = serde_json::to_string(&report).context("Failed to serialise run report")?;
    info!(report = %summary, "Backup run succeeded");
    Ok(())
}
