// dbarchiver/src/storage/memory.rs
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ObjectInfo, ObjectStore, StorageTier};
use crate::errors::{BackupError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub tier: StorageTier,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    container_exists: bool,
    objects: BTreeMap<String, StoredObject>,
    calls: Vec<String>,
    failing_operation: Option<&'static str>,
}

/// In-process [`ObjectStore`].
///
/// Objects are listed in name order like S3. Every call is recorded so tests
/// can assert on what reached the store, and one operation can be made to fail.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    container: String,
    state: Mutex<State>,
}

impl MemoryObjectStore {
    pub fn new(container: &str) -> Self {
        Self {
            container: container.to_string(),
            state: Mutex::default(),
        }
    }

    /// Seeds an object with an explicit last-modified time.
    pub fn insert_object(&self, name: &str, last_modified: DateTime<Utc>) {
        let mut state = self.lock();
        state.container_exists = true;
        state.objects.insert(
            name.to_string(),
            StoredObject {
                bytes: Vec::new(),
                tier: StorageTier::Hot,
                last_modified,
            },
        );
    }

    /// Makes every later call of `operation` (e.g. `"set_tier"`) fail.
    pub fn fail_on(&self, operation: &'static str) {
        self.lock().failing_operation = Some(operation);
    }

    pub fn object(&self, name: &str) -> Option<StoredObject> {
        self.lock().objects.get(name).cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn container_exists(&self) -> bool {
        self.lock().container_exists
    }

    /// Operations received so far, as `operation` or `operation:name`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the store from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: &'static str, name: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(match name {
            Some(name) => format!("{}:{}", operation, name),
            None => operation.to_string(),
        });
        if state.failing_operation == Some(operation) {
            return Err(BackupError::remote(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn container(&self) -> &str {
        &self.container
    }

    async fn ensure_container(&self) -> Result<()> {
        self.record("ensure_container", None)?;
        self.lock().container_exists = true;
        Ok(())
    }

    async fn upload_file(&self, name: &str, path: &Path) -> Result<u64> {
        self.record("upload_file", Some(name))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BackupError::io(format!("Failed to read {}", path.display()), e))?;
        let size = bytes.len() as u64;

        let mut state = self.lock();
        if !state.container_exists {
            return Err(BackupError::remote("upload_file", "container does not exist"));
        }
        state.objects.insert(
            name.to_string(),
            StoredObject {
                bytes,
                tier: StorageTier::Hot,
                last_modified: Utc::now(),
            },
        );
        Ok(size)
    }

    async fn set_tier(&self, name: &str, tier: StorageTier) -> Result<()> {
        self.record("set_tier", Some(name))?;
        let mut state = self.lock();
        let object = state
            .objects
            .get_mut(name)
            .ok_or_else(|| BackupError::remote("set_tier", format!("no such object {}", name)))?;
        object.tier = tier;
        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        self.record("list_objects", None)?;
        Ok(self
            .lock()
            .objects
            .iter()
            .map(|(name, object)| ObjectInfo {
                name: name.clone(),
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn delete_if_exists(&self, name: &str) -> Result<()> {
        self.record("delete_if_exists", Some(name))?;
        self.lock().objects.remove(name);
        Ok(())
    }
}
