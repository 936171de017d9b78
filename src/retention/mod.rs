//! Retention sweep of the backup container

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::errors::Result;
use crate::storage::ObjectStore;

/// `now - retention_days`; objects modified at or before this instant expire.
///
/// A window reaching past the earliest representable date yields
/// `DateTime::<Utc>::MIN_UTC`, so nothing expires.
pub fn cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(retention_days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Deletes every object in the container last modified at or before the cutoff.
///
/// Objects are visited in listing order and deleted one at a time; the first
/// failed delete ends the sweep. Returns the names that were deleted.
pub async fn sweep_expired(
    store: &dyn ObjectStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let cutoff = cutoff(now, retention_days);
    info!(
        "Sweeping container {} for backups modified at or before {}",
        store.container(),
        cutoff
    );

    let mut deleted = Vec::new();
    for object in store.list_objects().await? {
        if object.last_modified > cutoff {
            continue;
        }
        info!(
            "Deleting expired: {} Last modified: {}",
            object.name, object.last_modified
        );
        store.delete_if_exists(&object.name).await?;
        deleted.push(object.name);
    }

    info!("Retention sweep removed {} object(s)", deleted.len());
    Ok(deleted)
}
