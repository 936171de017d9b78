//! File-based locking to keep overlapping runs for one container apart

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fd_lock::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::errors::{BackupError, Result};

/// Lock file for the backup runs of one container.
///
/// The file is left in place after release; unlinking it would let a waiting
/// opener lock an inode nobody else can see.
pub struct RunLock {
    lock: RwLock<File>,
    lock_path: PathBuf,
}

impl RunLock {
    /// Opens (creating if needed) the lock file for `container_name` under `dir`.
    pub fn open(dir: &Path, container_name: &str) -> Result<Self> {
        let lock_path = Self::lock_path(dir, container_name);
        debug!("Opening run lock: {}", lock_path.display());

        std::fs::create_dir_all(dir).map_err(|e| {
            BackupError::io(format!("Failed to create lock directory {}", dir.display()), e)
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                BackupError::io(format!("Failed to open lock file {}", lock_path.display()), e)
            })?;

        Ok(Self {
            lock: RwLock::new(file),
            lock_path,
        })
    }

    /// Takes the exclusive lock without waiting.
    ///
    /// Fails with [`BackupError::Locked`] when another run holds it.
    pub fn try_acquire(&mut self) -> Result<RwLockWriteGuard<'_, File>> {
        let lock_path = &self.lock_path;
        self.lock.try_write().map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                BackupError::Locked(format!("lock held on {}", lock_path.display()))
            } else {
                BackupError::io(format!("Failed to lock {}", lock_path.display()), e)
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    fn lock_path(dir: &Path, container_name: &str) -> PathBuf {
        let safe: String = container_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        dir.join(format!("dbarchiver-{}.lock", safe))
    }
}
