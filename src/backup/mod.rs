mod logic;
pub mod db_dump;
pub mod s3_upload;

use std::fmt;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::config::Settings;
use crate::errors::BackupError;
use crate::storage::S3ObjectStore;
use db_dump::CommandDumper;

pub use logic::perform_backup_orchestration;

/// Steps of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStage {
    LoadSettings,
    Lock,
    Dump,
    Upload,
    Sweep,
    CleanupLocalFile,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::LoadSettings => "load settings",
            RunStage::Lock => "acquire run lock",
            RunStage::Dump => "dump",
            RunStage::Upload => "upload",
            RunStage::Sweep => "retention sweep",
            RunStage::CleanupLocalFile => "local file cleanup",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a run, tagged with the step that failed.
#[derive(Error, Debug)]
#[error("Backup run failed during {stage}: {source}")]
pub struct RunFailure {
    pub stage: RunStage,
    #[source]
    pub source: BackupError,
}

impl RunFailure {
    pub fn new(stage: RunStage, source: BackupError) -> Self {
        Self { stage, source }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub date: NaiveDate,
    pub container: String,
    pub object_name: String,
    pub bytes_uploaded: u64,
    pub deleted: Vec<String>,
}

/// Runs one backup against the real database and object storage.
///
/// The backup file and the run lock live in the OS temp directory. A database
/// URL that cannot be used fails in the dump stage, a malformed storage
/// connection string while loading settings.
pub async fn run_backup_flow(settings: &Settings) -> Result<RunReport, RunFailure> {
    let dumper = CommandDumper::new(&settings.database_url)
        .map_err(|e| RunFailure::new(RunStage::Dump, e))?;
    let store = S3ObjectStore::connect(
        &settings.storage_connection_string,
        &settings.container_name,
    )
    .await
    .map_err(|e| RunFailure::new(RunStage::LoadSettings, e))?;

    perform_backup_orchestration(
        settings,
        &dumper,
        &store,
        &std::env::temp_dir(),
        Local::now(),
    )
    .await
}
