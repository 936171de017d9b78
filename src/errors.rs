// dbarchiver/src/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database export failed: {0}")]
    Export(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object storage error during {operation}: {message}")]
    Remote { operation: &'static str, message: String },

    #[error("Another backup run is in progress: {0}")]
    Locked(String),
}

impl BackupError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BackupError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn remote(operation: &'static str, err: impl std::fmt::Display) -> Self {
        BackupError::Remote {
            operation,
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for BackupError {
    fn from(err: sqlx::Error) -> Self {
        BackupError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
