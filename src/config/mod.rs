// dbarchiver/src/config/mod.rs
use std::fmt;

use crate::errors::{BackupError, Result};
use crate::utils::{redact_connection_string, redact_url};

pub const DATABASE_CONNECTION_STRING: &str = "DatabaseConnectionString";
pub const STORAGE_CONNECTION_STRING: &str = "StorageAccountConnectionString";
pub const CONTAINER_NAME: &str = "ContainerName";
pub const RETENTION_DAYS: &str = "RetentionDays";

/// Configuration for one backup run.
///
/// Built once at the start of a run and handed by reference to every step.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_url: String,
    pub storage_connection_string: String,
    pub container_name: String,
    pub retention_days: u32,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to its value.
    ///
    /// The three string values are taken as-is (absent becomes empty); only
    /// `RetentionDays` is checked, since a bad value there would make the sweep
    /// delete the wrong objects.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_CONNECTION_STRING).unwrap_or_default();
        let storage_connection_string = lookup(STORAGE_CONNECTION_STRING).unwrap_or_default();
        let container_name = lookup(CONTAINER_NAME).unwrap_or_default();
        let retention_days = parse_retention_days(lookup(RETENTION_DAYS).as_deref())?;

        Ok(Settings {
            database_url,
            storage_connection_string,
            container_name,
            retention_days,
        })
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &redact_url(&self.database_url))
            .field(
                "storage_connection_string",
                &redact_connection_string(&self.storage_connection_string),
            )
            .field("container_name", &self.container_name)
            .field("retention_days", &self.retention_days)
            .finish()
    }
}

fn parse_retention_days(raw: Option<&str>) -> Result<u32> {
    let raw = raw.ok_or_else(|| {
        BackupError::Config(format!("{} must be set to a number of days", RETENTION_DAYS))
    })?;
    raw.trim().parse::<u32>().map_err(|e| {
        BackupError::Config(format!(
            "{} must be a non-negative whole number of days, got {:?}: {}",
            RETENTION_DAYS, raw, e
        ))
    })
}
