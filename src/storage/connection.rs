// dbarchiver/src/storage/connection.rs
use std::fmt;

use crate::errors::{BackupError, Result};

/// Parsed form of the `StorageAccountConnectionString` setting.
///
/// The string is a list of `Key=Value` pairs separated by `;`, for example
/// `Endpoint=https://fra1.digitaloceanspaces.com;Region=fra1;AccessKeyId=...;SecretAccessKey=...`.
/// Keys are case-insensitive. Anything left out is resolved by the AWS default
/// provider chain (environment, profile, instance metadata).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StorageConnection {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub force_path_style: Option<bool>,
}

impl StorageConnection {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut conn = StorageConnection::default();

        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                BackupError::Config(format!(
                    "Storage connection string segment {:?} is not of the form Key=Value",
                    key_only(segment)
                ))
            })?;
            let value = value.trim();
            let value = (!value.is_empty()).then(|| value.to_string());

            match key.trim().to_ascii_lowercase().as_str() {
                "endpoint" | "endpointurl" => conn.endpoint_url = value,
                "region" => conn.region = value,
                "accesskeyid" => conn.access_key_id = value,
                "secretaccesskey" => conn.secret_access_key = value,
                "sessiontoken" => conn.session_token = value,
                "forcepathstyle" => {
                    conn.force_path_style = value
                        .map(|v| parse_bool(&v))
                        .transpose()?;
                }
                other => {
                    return Err(BackupError::Config(format!(
                        "Unknown key {:?} in storage connection string",
                        other
                    )));
                }
            }
        }

        if conn.access_key_id.is_some() != conn.secret_access_key.is_some() {
            return Err(BackupError::Config(
                "Storage connection string must set AccessKeyId and SecretAccessKey together"
                    .to_string(),
            ));
        }

        Ok(conn)
    }

    /// Static credentials, when both halves of the key pair were given.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for StorageConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConnection")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

// A segment without '=' may be a pasted secret; only echo a prefix.
fn key_only(segment: &str) -> String {
    segment.chars().take(4).chain("...".chars()).collect()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(BackupError::Config(format!(
            "ForcePathStyle must be true or false, got {:?}",
            raw
        ))),
    }
}
