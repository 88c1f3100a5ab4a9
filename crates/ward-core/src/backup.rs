//! Backup of the database file and media directory

use crate::config::StorageConfig;
use crate::error::{Result, WardError};
use crate::notify::{send_system_alert, Notifier};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

/// Backup folder names, e.g. `20240305_091500`
const FOLDER_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub folder: PathBuf,
    pub files_copied: usize,
    pub pruned: Vec<PathBuf>,
}

pub struct BackupRunner {
    database_path: Option<PathBuf>,
    media_root: Option<PathBuf>,
    backup_root: PathBuf,
    retention_days: u64,
}

impl BackupRunner {
    pub fn new(storage: &StorageConfig, backup_root: PathBuf) -> Self {
        Self {
            database_path: storage.database_path.clone(),
            media_root: storage.media_root.clone(),
            backup_root,
            retention_days: storage.backup_retention_days,
        }
    }

    pub fn run(&self) -> Result<BackupReport> {
        self.run_at(Local::now())
    }

    /// Back up into a folder named after `now` and prune folders older than the retention period
    pub fn run_at(&self, now: DateTime<Local>) -> Result<BackupReport> {
        let timestamp = now.format(FOLDER_FORMAT).to_string();
        let folder = self.backup_root.join(&timestamp);
        fs::create_dir_all(&folder)?;

        let mut files_copied = 0;

        if let Some(db_path) = &self.database_path {
            if !db_path.is_file() {
                return Err(WardError::NotFound(format!(
                    "Database file not found: {}",
                    db_path.display()
                )));
            }
            let extension = db_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("db");
            let target = folder.join(format!("database_{}.{}", timestamp, extension));
            fs::copy(db_path, &target)?;
            files_copied += 1;
            log::info!("Database backed up to: {}", target.display());
        }

        if let Some(media_root) = &self.media_root {
            if media_root.is_dir() {
                let target = folder.join("media");
                files_copied += copy_tree(media_root, &target)?;
                log::info!("Media files backed up to: {}", target.display());
            } else {
                log::warn!("Media directory {} not found, skipping", media_root.display());
            }
        }

        let pruned = self.prune(now)?;

        log::info!("Backup completed successfully: {}", folder.display());
        Ok(BackupReport {
            folder,
            files_copied,
            pruned,
        })
    }

    /// Remove backup folders whose timestamp is older than the retention period
    fn prune(&self, now: DateTime<Local>) -> Result<Vec<PathBuf>> {
        let cutoff = now.naive_local() - ChronoDuration::days(self.retention_days as i64);
        let mut pruned = Vec::new();

        for entry in fs::read_dir(&self.backup_root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let taken_at = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| NaiveDateTime::parse_from_str(n, FOLDER_FORMAT).ok());

            if matches!(taken_at, Some(t) if t < cutoff) {
                fs::remove_dir_all(&path)?;
                log::info!("Removed old backup: {}", path.display());
                pruned.push(path);
            }
        }

        Ok(pruned)
    }

    /// Run the backup and mail the result to the admins
    pub async fn run_and_report(&self, notifier: &dyn Notifier, admins: &[String]) -> Result<BackupReport> {
        let result = self.run();

        let (subject, body) = match &result {
            Ok(report) => (
                "Ward System Backup Successful",
                format!("Backup details: {}", report.folder.display()),
            ),
            Err(e) => {
                log::error!("Backup failed: {}", e);
                ("Ward System Backup Failed", format!("Backup details: {}", e))
            }
        };
        send_system_alert(notifier, admins, subject, &body).await;

        result
    }
}

/// Recursively copy a directory, returning the number of files copied
fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    fs::create_dir_all(to)?;
    let mut copied = 0;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}
