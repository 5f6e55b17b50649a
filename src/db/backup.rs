// Database backups
// Snapshots use SQLite's online backup API, never a raw file copy, so a concurrent
// writer cannot leave a torn file behind. Old snapshots are rotated by modification time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, DatabaseName};

use super::Database;
use crate::config::DbConfig;
use crate::constants::{BACKUP_DEFAULT_EXTENSION, BACKUP_PREFIX, BACKUP_TIMESTAMP_FORMAT};
use crate::error::{DalError, Result};

/// A backup file found in the backup directory.
#[derive(Debug, Clone)]
pub struct BackupFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

/// Backup filename for a point in time: backup-2024-05-01T10-20-30-123Z.db
pub fn backup_file_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("{}{}.{}", BACKUP_PREFIX, at.format(BACKUP_TIMESTAMP_FORMAT), extension)
}

/// Backups keep the storage file's extension.
pub fn backup_extension(config: &DbConfig) -> String {
    if config.in_memory {
        return BACKUP_DEFAULT_EXTENSION.to_string();
    }
    config
        .db_path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(BACKUP_DEFAULT_EXTENSION)
        .to_string()
}

/// Snapshot the live database into the backup directory, then rotate.
/// Returns the path of the new snapshot.
pub fn snapshot(conn: &Connection, config: &DbConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.backup_dir).map_err(|e| {
        DalError::Backup(format!(
            "cannot create backup directory {}: {}",
            config.backup_dir.display(),
            e
        ))
    })?;

    let target = unique_target(&config.backup_dir, &backup_extension(config));
    if !config.in_memory && same_file(&target, &config.db_path) {
        return Err(DalError::Backup(format!(
            "backup target {} is the live database",
            target.display()
        )));
    }

    conn.backup(DatabaseName::Main, &target, None)
        .map_err(|e| DalError::Backup(format!("snapshot to {} failed: {}", target.display(), e)))?;
    log::info!("Database backup written to {}", target.display());

    // The snapshot just written always survives its own rotation
    let removed = rotate_backups(&config.backup_dir, config.backup_retention.max(1))?;
    if !removed.is_empty() {
        log::info!("Removed {} old backup(s)", removed.len());
    }

    Ok(target)
}

fn unique_target(dir: &Path, extension: &str) -> PathBuf {
    let now = Utc::now();
    let base = dir.join(backup_file_name(now, extension));
    if !base.exists() {
        return base;
    }
    // Two snapshots inside the same millisecond
    let stem = backup_file_name(now, "");
    let stem = stem.trim_end_matches('.');
    (1..)
        .map(|n| dir.join(format!("{}-{}.{}", stem, n, extension)))
        .find(|p| !p.exists())
        .unwrap_or(base)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// List backup files, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<BackupFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_backup = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(BACKUP_PREFIX))
            .unwrap_or(false);
        if !is_backup || !path.is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        backups.push(BackupFile {
            path,
            modified: metadata.modified()?,
            size_bytes: metadata.len(),
        });
    }

    backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.path.cmp(&a.path)));
    Ok(backups)
}

/// Delete backups beyond `retention`, oldest first. Returns the removed paths.
pub fn rotate_backups(dir: &Path, retention: usize) -> Result<Vec<PathBuf>> {
    let backups = list_backups(dir)?;
    let mut removed = Vec::new();
    for old in backups.into_iter().skip(retention) {
        std::fs::remove_file(&old.path).map_err(|e| {
            DalError::Backup(format!("cannot remove old backup {}: {}", old.path.display(), e))
        })?;
        removed.push(old.path);
    }
    Ok(removed)
}

/// Periodic backup thread. Stops when `stop()` is called or the handle is dropped.
pub struct BackupWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackupWorker {
    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Backup worker: thread panicked");
            }
        }
    }
}

impl Drop for BackupWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn a thread that snapshots `db` every `interval`. Failures are logged and retried
/// on the next tick.
pub fn spawn_backup_worker(db: Arc<Database>, interval: Duration) -> Result<BackupWorker> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = std::thread::Builder::new()
        .name("db-backup".into())
        .spawn(move || loop {
            std::thread::park_timeout(interval);
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            if let Err(e) = db.backup() {
                log::error!("Backup worker: backup failed: {}", e);
            }
        })?;

    Ok(BackupWorker {
        stop,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use filetime::FileTime;

    fn touch(dir: &Path, name: &str, mtime_secs: i64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"snapshot").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
        path
    }

    #[test]
    fn test_backup_file_name_layout() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap();
        assert_eq!(backup_file_name(at, "db"), "backup-2024-05-01T10-20-30-000Z.db");
    }

    #[test]
    fn test_extension_follows_storage_file() {
        let config = DbConfig::new("/data/catalog.sqlite3");
        assert_eq!(backup_extension(&config), "sqlite3");

        let config = DbConfig::new("/data/catalog");
        assert_eq!(backup_extension(&config), "db");

        assert_eq!(backup_extension(&DbConfig::test()), "db");
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = touch(dir.path(), "backup-a.db", 1_000);
        let old = touch(dir.path(), "backup-b.db", 2_000);
        let newer = touch(dir.path(), "backup-c.db", 3_000);
        let newest = touch(dir.path(), "backup-d.db", 4_000);
        let unrelated = touch(dir.path(), "notes.txt", 500);

        let removed = rotate_backups(dir.path(), 2).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!oldest.exists());
        assert!(!old.exists());
        assert!(newer.exists());
        assert!(newest.exists());
        assert!(unrelated.exists(), "non-backup files are left alone");

        let remaining = list_backups(dir.path()).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].path, newest);
    }

    #[test]
    fn test_rotation_under_retention_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "backup-a.db", 1_000);
        let removed = rotate_backups(dir.path(), 5).unwrap();
        assert!(removed.is_empty());
        assert_eq!(list_backups(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_is_readable_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DbConfig::test();
        config.backup_dir = dir.path().join("backups");

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);").unwrap();

        let path = snapshot(&conn, &config).unwrap();
        assert!(path.starts_with(&config.backup_dir));

        let copy = Connection::open(&path).unwrap();
        let x: i64 = copy.query_row("SELECT x FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn test_zero_retention_keeps_new_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DbConfig::test();
        config.backup_dir = dir.path().to_path_buf();
        config.backup_retention = 0;
        let stale = touch(dir.path(), "backup-old.db", 1_000);

        let conn = Connection::open_in_memory().unwrap();
        let path = snapshot(&conn, &config).unwrap();
        assert!(path.exists());
        assert!(!stale.exists());
        assert_eq!(list_backups(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_worker_snapshots_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DbConfig::new(dir.path().join("catalog.db"));
        config.seed_enabled = false;
        config.backup_retention = 50;
        let backup_dir = config.backup_dir.clone();
        let db = Arc::new(Database::open(config).unwrap());

        let worker = spawn_backup_worker(Arc::clone(&db), Duration::from_millis(20)).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        worker.stop();

        let taken = list_backups(&backup_dir).unwrap().len();
        assert!(taken >= 1, "worker should have written at least one snapshot");
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(list_backups(&backup_dir).unwrap().len(), taken, "no snapshots after stop");
    }
}
