// dbarchiver/src/backup/logic.rs
use std::path::Path;

use chrono::{DateTime, Local, Utc};
use tracing::{info, warn};

use super::db_dump::DatabaseDumper;
use super::s3_upload::upload_to_archive;
use super::{RunFailure, RunReport, RunStage};
use crate::config::Settings;
use crate::errors::BackupError;
use crate::retention::sweep_expired;
use crate::storage::ObjectStore;
use crate::utils::locker::RunLock;

/// Dump, upload, sweep and clean up, in that order.
///
/// `work_dir` holds the backup file and the run lock; `now` fixes both the
/// backup file's date and the retention cutoff. Once the dump has produced a
/// file, the file is removed even when the upload or sweep fails.
pub async fn perform_backup_orchestration(
    settings: &Settings,
    dumper: &dyn DatabaseDumper,
    store: &dyn ObjectStore,
    work_dir: &Path,
    now: DateTime<Local>,
) -> Result<RunReport, RunFailure> {
    info!("Starting database backup run: {:?}", settings);

    let mut lock = RunLock::open(work_dir, &settings.container_name)
        .map_err(|e| RunFailure::new(RunStage::Lock, e))?;
    let _guard = lock
        .try_acquire()
        .map_err(|e| RunFailure::new(RunStage::Lock, e))?;

    let date = now.date_naive();
    let file = dumper
        .dump(work_dir, date)
        .await
        .map_err(|e| RunFailure::new(RunStage::Dump, e))?;

    let uploaded = match upload_to_archive(store, &file).await {
        Ok(uploaded) => uploaded,
        Err(e) => return Err(fail_and_clean_up(&file, RunStage::Upload, e)),
    };

    let swept = sweep_expired(store, settings.retention_days, now.with_timezone(&Utc)).await;
    let deleted = match swept {
        Ok(deleted) => deleted,
        Err(e) => return Err(fail_and_clean_up(&file, RunStage::Sweep, e)),
    };

    std::fs::remove_file(&file).map_err(|e| {
        RunFailure::new(
            RunStage::CleanupLocalFile,
            BackupError::io(format!("Failed to remove {}", file.display()), e),
        )
    })?;

    info!(
        "Backup run completed: {} uploaded, {} expired object(s) removed",
        uploaded.name,
        deleted.len()
    );
    Ok(RunReport {
        date,
        container: store.container().to_string(),
        object_name: uploaded.name,
        bytes_uploaded: uploaded.bytes,
        deleted,
    })
}

fn fail_and_clean_up(file: &Path, stage: RunStage, source: BackupError) -> RunFailure {
    match std::fs::remove_file(file) {
        Ok(()) => info!("Removed local backup file {} after failed {}", file.display(), stage),
        Err(e) => warn!("Failed to remove local backup file {}: {}", file.display(), e),
    }
    RunFailure::new(stage, source)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use tempfile::TempDir;

    use super::*;
    use crate::backup::db_dump::backup_file_path;
    use crate::errors::Result;
    use crate::storage::{MemoryObjectStore, ObjectInfo, StorageTier};

    /// Writes a fixed payload, or a partial file followed by an export error.
    struct FakeDumper {
        payload: &'static [u8],
        fail: bool,
        calls: AtomicUsize,
    }

    impl FakeDumper {
        fn ok(payload: &'static [u8]) -> Self {
            Self {
                payload,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                payload: b"-- partial",
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DatabaseDumper for FakeDumper {
        async fn dump(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let file = backup_file_path(dir, date, "sql");
            std::fs::write(&file, self.payload)
                .map_err(|e| BackupError::io("Failed to write dump", e))?;
            if self.fail {
                return Err(BackupError::Export("pg_dump failed with status: 1".to_string()));
            }
            Ok(file)
        }
    }

    /// Accepts uploads, then removes the uploaded local file behind the run's back.
    struct FileStealingStore(MemoryObjectStore);

    #[async_trait]
    impl ObjectStore for FileStealingStore {
        fn container(&self) -> &str {
            self.0.container()
        }

        async fn ensure_container(&self) -> Result<()> {
            self.0.ensure_container().await
        }

        async fn upload_file(&self, name: &str, path: &Path) -> Result<u64> {
            let bytes = self.0.upload_file(name, path).await?;
            std::fs::remove_file(path).map_err(|e| BackupError::io("Failed to remove", e))?;
            Ok(bytes)
        }

        async fn set_tier(&self, name: &str, tier: StorageTier) -> Result<()> {
            self.0.set_tier(name, tier).await
        }

        async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
            self.0.list_objects().await
        }

        async fn delete_if_exists(&self, name: &str) -> Result<()> {
            self.0.delete_if_exists(name).await
        }
    }

    fn settings(retention_days: u32) -> Settings {
        Settings {
            database_url: "postgres://app@db/shop".to_string(),
            storage_connection_string: String::new(),
            container_name: "shop-backups".to_string(),
            retention_days,
        }
    }

    fn run_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 2, 0, 0).earliest().unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        run_time().with_timezone(&Utc) - Duration::days(days)
    }

    async fn run(
        dumper: &FakeDumper,
        store: &dyn ObjectStore,
        work_dir: &TempDir,
    ) -> std::result::Result<RunReport, RunFailure> {
        perform_backup_orchestration(&settings(30), dumper, store, work_dir.path(), run_time())
            .await
    }

    #[tokio::test]
    async fn test_successful_run_archives_todays_backup() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::ok(b"CREATE TABLE orders ();");
        let store = MemoryObjectStore::new("shop-backups");

        let report = run(&dumper, &store, &work_dir).await?;

        assert_eq!(report.object_name, "2024-03-07.sql");
        assert_eq!(report.bytes_uploaded, 23);
        assert_eq!(report.container, "shop-backups");
        assert!(report.deleted.is_empty());

        let object = store.object("2024-03-07.sql").expect("backup object missing");
        assert_eq!(object.tier, StorageTier::Archive);
        assert_eq!(object.bytes, b"CREATE TABLE orders ();");
        assert!(!work_dir.path().join("2024-03-07.sql").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_sweeps_backups_outside_retention_window() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::ok(b"dump");
        let store = MemoryObjectStore::new("shop-backups");
        store.insert_object("2024-01-27.sql", days_ago(40));
        store.insert_object("2024-02-16.sql", days_ago(20));
        store.insert_object("2024-03-02.sql", days_ago(5));

        let report = run(&dumper, &store, &work_dir).await?;

        assert_eq!(report.deleted, vec!["2024-01-27.sql"]);
        assert_eq!(
            store.object_names(),
            vec!["2024-02-16.sql", "2024-03-02.sql", "2024-03-07.sql"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_two_runs_on_the_same_day_leave_one_object() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let store = MemoryObjectStore::new("shop-backups");

        perform_backup_orchestration(
            &settings(30),
            &FakeDumper::ok(b"morning"),
            &store,
            work_dir.path(),
            run_time(),
        )
        .await?;
        perform_backup_orchestration(
            &settings(30),
            &FakeDumper::ok(b"evening"),
            &store,
            work_dir.path(),
            run_time() + Duration::hours(12),
        )
        .await?;

        assert_eq!(store.object_names(), vec!["2024-03-07.sql"]);
        assert_eq!(store.object("2024-03-07.sql").unwrap().bytes, b"evening");
        Ok(())
    }

    #[tokio::test]
    async fn test_export_failure_stops_before_upload() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::failing();
        let store = MemoryObjectStore::new("shop-backups");

        let failure = run(&dumper, &store, &work_dir).await.expect_err("run should fail");

        assert_eq!(failure.stage, RunStage::Dump);
        assert!(matches!(failure.source, BackupError::Export(_)));
        assert!(store.calls().is_empty());
        assert!(work_dir.path().join("2024-03-07.sql").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_failure_still_removes_local_file() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::ok(b"dump");
        let store = MemoryObjectStore::new("shop-backups");
        store.fail_on("upload_file");

        let failure = run(&dumper, &store, &work_dir).await.expect_err("run should fail");

        assert_eq!(failure.stage, RunStage::Upload);
        assert!(!store.calls().iter().any(|c| c == "list_objects"));
        assert!(!work_dir.path().join("2024-03-07.sql").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_failure_keeps_uploaded_backup() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::ok(b"dump");
        let store = MemoryObjectStore::new("shop-backups");
        store.fail_on("list_objects");

        let failure = run(&dumper, &store, &work_dir).await.expect_err("run should fail");

        assert_eq!(failure.stage, RunStage::Sweep);
        assert_eq!(store.object("2024-03-07.sql").unwrap().tier, StorageTier::Archive);
        assert!(!work_dir.path().join("2024-03-07.sql").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_vanished_local_file_fails_cleanup() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::ok(b"dump");
        let store = FileStealingStore(MemoryObjectStore::new("shop-backups"));
        store.0.insert_object("2024-01-27.sql", days_ago(40));

        let failure = run(&dumper, &store, &work_dir).await.expect_err("run should fail");

        assert_eq!(failure.stage, RunStage::CleanupLocalFile);
        assert!(matches!(failure.source, BackupError::Io { .. }));
        // Upload and sweep had already finished.
        assert_eq!(store.0.object_names(), vec!["2024-03-07.sql"]);
        assert_eq!(store.0.object("2024-03-07.sql").unwrap().tier, StorageTier::Archive);
        Ok(())
    }

    #[tokio::test]
    async fn test_overlapping_run_is_refused() -> anyhow::Result<()> {
        let work_dir = TempDir::new()?;
        let dumper = FakeDumper::ok(b"dump");
        let store = MemoryObjectStore::new("shop-backups");

        let mut held = RunLock::open(work_dir.path(), "shop-backups")?;
        let _guard = held.try_acquire()?;

        let failure = run(&dumper, &store, &work_dir)
            .await
            .expect_err("run should be locked out");

        assert_eq!(failure.stage, RunStage::Lock);
        assert!(matches!(failure.source, BackupError::Locked(_)));
        assert_eq!(dumper.calls(), 0);
        assert!(store.calls().is_empty());
        Ok(())
    }
}
