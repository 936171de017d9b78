//! Object storage collaborators
//!
//! The backup pipeline only needs five operations from a blob store; they are
//! collected in [`ObjectStore`] so the S3 client and the in-process store used by
//! tests are interchangeable.

pub mod connection;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::Result;

pub use connection::StorageConnection;
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryObjectStore;
pub use s3::S3ObjectStore;

/// Storage class of an object, from cheapest to read to cheapest to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StorageTier {
    Hot,
    Cool,
    Cold,
    Archive,
}

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container (bucket) this store writes to.
    fn container(&self) -> &str;

    /// Creates the container unless it already exists.
    async fn ensure_container(&self) -> Result<()>;

    /// Uploads the file at `path` as `name`, replacing any object of that name.
    /// Returns the number of bytes sent.
    async fn upload_file(&self, name: &str, path: &Path) -> Result<u64>;

    async fn set_tier(&self, name: &str, tier: StorageTier) -> Result<()>;

    /// Lists every object in the container, all pages included.
    async fn list_objects(&self) -> Result<Vec<ObjectInfo>>;

    /// Deletes `name`; deleting a missing object is not an error.
    async fn delete_if_exists(&self, name: &str) -> Result<()>;
}
