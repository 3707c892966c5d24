//! Configuration backup and restore
//!
//! Archives a fixed set of paths below a source directory into
//! timestamp-named gzipped tarballs, keeps only the newest few, and can
//! restore any of them back over the source.

use chrono::{Local, NaiveDateTime, TimeDelta};
use guardctl_core::{shell, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Number of archives kept after each new backup
pub const DEFAULT_RETENTION: usize = 10;

const NAME_PREFIX: &str = "backup-";
const NAME_SUFFIX: &str = ".tar.gz";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// A backup file in the backup directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created: NaiveDateTime,
}

/// Result of a restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: String,
    /// Snapshot of the state that was overwritten
    pub safety_backup: Option<BackupArchive>,
}

/// File name for a backup taken at `ts`
pub fn archive_name(ts: NaiveDateTime) -> String {
    format!("{}{}{}", NAME_PREFIX, ts.format(TIMESTAMP_FORMAT), NAME_SUFFIX)
}

/// Timestamp of a well-formed archive name
///
/// Anything else, including names with path separators, gives `None`.
pub fn parse_archive_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(NAME_PREFIX)?.strip_suffix(NAME_SUFFIX)?;
    if stamp.len() != 15 || !stamp.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

fn validate_name(name: &str) -> Result<NaiveDateTime> {
    parse_archive_name(name).ok_or_else(|| {
        Error::Validation(format!(
            "'{}' is not a backup name (expected backup-YYYYMMDD-HHMMSS.tar.gz)",
            name
        ))
    })
}

/// Backup/Restore Archiver
#[derive(Debug, Clone)]
pub struct Archiver {
    backup_dir: PathBuf,
    source_dir: PathBuf,
    tracked_paths: Vec<String>,
    retention: usize,
}

impl Archiver {
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        source_dir: impl Into<PathBuf>,
        tracked_paths: Vec<String>,
    ) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            source_dir: source_dir.into(),
            tracked_paths,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Tracked paths that currently exist below the source directory
    fn existing_paths(&self) -> Vec<&str> {
        self.tracked_paths
            .iter()
            .filter(|p| {
                let exists = self.source_dir.join(p).exists();
                if !exists {
                    warn!(path = %p, "Tracked path missing; skipping");
                }
                exists
            })
            .map(String::as_str)
            .collect()
    }

    /// Create a backup now and prune old ones
    pub async fn create(&self) -> Result<BackupArchive> {
        self.create_at(Local::now().naive_local()).await
    }

    /// Create a backup named after `ts` and prune old ones
    ///
    /// If an archive with that name already exists the timestamp is moved
    /// forward a second at a time until the name is free.
    #[instrument(skip(self))]
    pub async fn create_at(&self, ts: NaiveDateTime) -> Result<BackupArchive> {
        let created = self.write_archive(ts).await?;
        self.prune(self.retention).await?;
        Ok(created)
    }

    /// Write an archive without applying retention
    async fn write_archive(&self, ts: NaiveDateTime) -> Result<BackupArchive> {
        let paths = self.existing_paths();
        if paths.is_empty() {
            return Err(Error::Validation(format!(
                "None of the tracked paths exist under {}",
                self.source_dir.display()
            )));
        }

        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let mut ts = ts;
        let mut path = self.backup_dir.join(archive_name(ts));
        while tokio::fs::try_exists(&path).await? {
            ts += TimeDelta::seconds(1);
            path = self.backup_dir.join(archive_name(ts));
        }

        let archive = path.to_string_lossy().to_string();
        let source = self.source_dir.to_string_lossy().to_string();
        let mut args = vec!["-czf", archive.as_str(), "-C", source.as_str(), "--"];
        args.extend(paths.iter().copied());

        shell::run("tar", &args).await?;

        let created = self.describe(&path, ts).await?;
        info!(archive = %created.name, size = created.size_bytes, "Backup created");
        Ok(created)
    }

    async fn describe(&self, path: &Path, created: NaiveDateTime) -> Result<BackupArchive> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(BackupArchive {
            name: archive_name(created),
            path: path.to_path_buf(),
            size_bytes: meta.len(),
            created,
        })
    }

    /// All archives, newest first
    pub async fn list(&self) -> Result<Vec<BackupArchive>> {
        let mut entries = match tokio::fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(created) = parse_archive_name(&name) else {
                continue;
            };
            let meta = entry.metadata().await?;
            archives.push(BackupArchive {
                name,
                path: entry.path(),
                size_bytes: meta.len(),
                created,
            });
        }

        archives.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(archives)
    }

    /// Path of an existing archive
    async fn locate(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        let path = self.backup_dir.join(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::NotFound(format!("Backup '{}'", name)));
        }
        Ok(path)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.locate(name).await?;
        tokio::fs::remove_file(&path).await?;
        info!(archive = %name, "Backup deleted");
        Ok(())
    }

    /// Delete the oldest archives beyond `keep`; returns deleted names
    pub async fn prune(&self, keep: usize) -> Result<Vec<String>> {
        let archives = self.list().await?;
        let mut deleted = Vec::new();

        for archive in archives.into_iter().skip(keep) {
            tokio::fs::remove_file(&archive.path).await?;
            info!(archive = %archive.name, "Pruned old backup");
            deleted.push(archive.name);
        }

        Ok(deleted)
    }

    /// Extract an archive into `dest`
    pub async fn extract_to(&self, name: &str, dest: &Path) -> Result<()> {
        let path = self.locate(name).await?;
        tokio::fs::create_dir_all(dest).await?;

        let archive = path.to_string_lossy().to_string();
        let dest = dest.to_string_lossy().to_string();
        shell::run("tar", &["-xzf", archive.as_str(), "-C", dest.as_str()]).await?;
        Ok(())
    }

    /// Restore an archive over the source directory
    ///
    /// Snapshots the current state first (outside retention, so the
    /// archive being restored is never pruned), extracts into a staging
    /// directory, then swaps every tracked path for its archived version.
    /// Tracked paths absent from the archive are removed. A failed
    /// extract or swap leaves the live paths as they were.
    #[instrument(skip(self))]
    pub async fn restore(&self, name: &str) -> Result<RestoreReport> {
        self.locate(name).await?;

        let safety_backup = if self.existing_paths().is_empty() {
            None
        } else {
            Some(self.write_archive(Local::now().naive_local()).await?)
        };

        tokio::fs::create_dir_all(&self.source_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".guardctl-restore-")
            .tempdir_in(&self.source_dir)?;
        let extracted = staging.path().join("extracted");
        let previous = staging.path().join("previous");
        self.extract_to(name, &extracted).await?;

        let mut swap = Swap::default();
        if let Err(e) = self.swap_in(&extracted, &previous, &mut swap).await {
            warn!(archive = %name, error = %e, "Restore failed; putting live paths back");
            self.roll_back(&previous, &swap).await;
            return Err(e);
        }

        info!(archive = %name, "Backup restored");
        Ok(RestoreReport {
            restored: name.to_string(),
            safety_backup,
        })
    }

    /// Move live tracked paths into `previous`, then staged ones into place
    async fn swap_in(
        &self,
        extracted: &Path,
        previous: &Path,
        swap: &mut Swap,
    ) -> Result<()> {
        for tracked in &self.tracked_paths {
            let live = self.source_dir.join(tracked);
            if tokio::fs::symlink_metadata(&live).await.is_ok() {
                move_path(&live, &previous.join(tracked)).await?;
                swap.moved_out.push(tracked.clone());
            }
        }

        for tracked in &self.tracked_paths {
            let staged = extracted.join(tracked);
            if tokio::fs::symlink_metadata(&staged).await.is_ok() {
                move_path(&staged, &self.source_dir.join(tracked)).await?;
                swap.moved_in.push(tracked.clone());
            }
        }
        Ok(())
    }

    async fn roll_back(&self, previous: &Path, swap: &Swap) {
        for tracked in &swap.moved_in {
            if let Err(e) = remove_path(&self.source_dir.join(tracked)).await {
                warn!(path = %tracked, error = %e, "Could not clear partially restored path");
            }
        }
        for tracked in &swap.moved_out {
            if let Err(e) = move_path(&previous.join(tracked), &self.source_dir.join(tracked)).await {
                warn!(path = %tracked, error = %e, "Could not put live path back");
            }
        }
    }
}

/// Tracked paths moved so far during a restore
#[derive(Debug, Default)]
struct Swap {
    moved_out: Vec<String>,
    moved_in: Vec<String>,
}

/// Rename `from` to `to`, creating `to`'s parent
async fn move_path(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(from, to).await?;
    Ok(())
}

async fn remove_path(path: &Path) -> Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await?,
        Ok(_) => tokio::fs::remove_file(path).await?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
