//! Scheduled database backup to object storage
//!
//! One run dumps a PostgreSQL or MySQL database to a date-named file, uploads
//! it to an S3-compatible bucket at the archive tier, and deletes objects older
//! than the retention window.

pub mod backup;
pub mod config;
pub mod errors;
pub mod retention;
pub mod storage;
pub mod utils;

pub use backup::{RunFailure, RunReport, RunStage, perform_backup_orchestration, run_backup_flow};
pub use config::Settings;
pub use errors::BackupError;
