// dbarchiver/src/backup/s3_upload.rs
use std::path::Path;

use tracing::info;

use crate::errors::{BackupError, Result};
use crate::storage::{ObjectStore, StorageTier};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub name: String,
    pub bytes: u64,
}

/// Uploads a backup file to the store's container and moves it to the archive tier.
///
/// The object is named after the file's base name. Upload and tier change are
/// separate calls: if the second fails the object stays at its default tier.
pub async fn upload_to_archive(
    store: &dyn ObjectStore,
    file_path: &Path,
) -> Result<UploadedObject> {
    let name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            BackupError::io(
                format!("Invalid backup file name: {}", file_path.display()),
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?
        .to_string();

    store.ensure_container().await?;

    info!(
        "Uploading {} to container {} as {}",
        file_path.display(),
        store.container(),
        name
    );
    let bytes = store.upload_file(&name, file_path).await?;
    store.set_tier(&name, StorageTier::Archive).await?;

    info!(
        "Uploaded {} ({} bytes) to {} at {:?} tier",
        name,
        bytes,
        store.container(),
        StorageTier::Archive
    );
    Ok(UploadedObject { name, bytes })
}
