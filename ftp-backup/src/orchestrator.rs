//! Backup and restore runs.
//!
//! A backup run is dump → package → upload → retention → cleanup; a restore
//! run is list → select → download → unpack → restore. Each run opens at most
//! one transport session and releases it on every exit path. Every decision is
//! taken from a listing fetched during the same run.

use crate::archive::packager::{self, LocalArchive};
use crate::archive::{ArchiveName, SourceKind};
use crate::config::{AppConfig, TransportConfig};
use crate::retention::{select_for_deletion, RetentionReport};
use crate::selector;
use crate::source::DumpSource;
use crate::transfer::progress::format_bytes;
use crate::transport::{join_remote, remote_file_name, Connector, RemoteArchiveEntry, Session};
use crate::utils::errors::{BackupError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Backup run result
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub archive: ArchiveName,
    pub remote_path: String,
    pub bytes_uploaded: u64,
    pub retention: RetentionReport,
}

/// Restore run result
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// File name of the archive that was restored
    pub archive: String,
    pub bytes_downloaded: u64,
}

/// Where a restore run takes its archive from
#[derive(Debug, Clone)]
pub enum RestoreFrom {
    /// Newest remote archive, or the one with this file name
    Remote { name: Option<String> },
    /// An archive already on local disk; the remote store is not contacted
    LocalArchive(PathBuf),
}

pub struct Orchestrator<'a> {
    config: &'a AppConfig,
    connector: &'a dyn Connector,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a AppConfig, connector: &'a dyn Connector, cancel: CancellationToken) -> Self {
        Self {
            config,
            connector,
            cancel,
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(BackupError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        std::fs::create_dir_all(&self.config.work_dir)
            .and_then(|_| {
                tempfile::Builder::new()
                    .prefix("ftp-backup-")
                    .tempdir_in(&self.config.work_dir)
            })
            .map_err(|e| {
                BackupError::Packaging(format!(
                    "Cannot create scratch directory in {}: {}",
                    self.config.work_dir.display(),
                    e
                ))
            })
    }

    /// Run a full backup of `source`.
    ///
    /// The local archive is deleted only after a successful upload; on any
    /// later failure it stays in the work directory for manual recovery.
    pub fn backup(&self, source: &dyn DumpSource) -> Result<BackupReport> {
        let kind = source.kind();
        let source_id = source.source_id()?;
        info!(kind = %kind, source = %source_id, "Starting backup");
        let transport = self.config.transport()?;

        self.checkpoint()?;
        let archive = {
            let scratch = self.scratch_dir()?;
            let payload = source.dump(scratch.path())?;
            self.checkpoint()?;
            packager::package(kind, &source_id, &payload, &self.config.work_dir)?
        };

        match self.ship(&archive, transport) {
            Ok(report) => {
                archive.remove();
                info!(
                    archive = %report.archive,
                    deleted = report.retention.deleted_count(),
                    failed = report.retention.failed_count(),
                    "Backup completed"
                );
                Ok(report)
            }
            Err(e) => {
                error!("Backup of {} failed: {}", archive.name, e);
                warn!("Local archive kept at {}", archive.path.display());
                Err(e)
            }
        }
    }

    fn ship(&self, archive: &LocalArchive, transport: &TransportConfig) -> Result<BackupReport> {
        let mut session = Session::open(self.connector, transport, &self.cancel)?;

        session.ensure_remote_dir(&transport.dest_dir)?;
        self.checkpoint()?;

        let remote_path = join_remote(&transport.dest_dir, &archive.name.file_name());
        let bytes_uploaded = session.upload(&archive.path, &remote_path)?;
        info!("Uploaded {} ({})", remote_path, format_bytes(bytes_uploaded));

        let retention = self.enforce_retention(&mut session, &transport.dest_dir, &archive.name);

        if let Err(e) = session.close() {
            warn!("Closing transport session failed: {}", e);
        }

        Ok(BackupReport {
            archive: archive.name.clone(),
            remote_path,
            bytes_uploaded,
            retention,
        })
    }

    /// Delete expired archives of the source that was just uploaded. Failures
    /// are logged and counted, never propagated.
    fn enforce_retention(&self, session: &mut Session, dest_dir: &str, uploaded: &ArchiveName) -> RetentionReport {
        let mut report = RetentionReport::default();
        let policy = self.config.retention;
        if policy.keeps_everything() {
            info!("Retention disabled, keeping all archives");
            return report;
        }

        let entries = match session.list(dest_dir) {
            Ok(entries) => for_source(entries, uploaded.kind(), uploaded.source_id()),
            Err(e) => {
                warn!("Skipping retention, cannot list {}: {}", dest_dir, e);
                return report;
            }
        };

        let expired = select_for_deletion(&entries, policy, Utc::now());
        for entry in expired.iter().filter(|e| &e.name != uploaded) {
            if self.cancel.is_cancelled() {
                warn!("Retention interrupted by shutdown");
                break;
            }
            info!("Deleting old backup {}", entry.remote_path);
            match session.delete(&entry.remote_path) {
                Ok(()) => report.deleted.push(entry.remote_path.clone()),
                Err(e) if e.is_not_found() => {
                    info!("{} already gone", entry.remote_path);
                    report.deleted.push(entry.remote_path.clone());
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", entry.remote_path, e);
                    report.failed.push(entry.remote_path.clone());
                }
            }
        }

        report
    }

    /// Restore `source` from a remote or local archive.
    pub fn restore(&self, source: &dyn DumpSource, from: RestoreFrom) -> Result<RestoreReport> {
        let kind = source.kind();
        let source_id = source.source_id()?;
        info!(kind = %kind, source = %source_id, "Starting restore");

        self.checkpoint()?;
        let scratch = self.scratch_dir()?;

        let (archive, local_path, bytes) = match from {
            RestoreFrom::LocalArchive(path) => {
                let bytes = std::fs::metadata(&path)
                    .map_err(|e| BackupError::Packaging(format!("Cannot read {}: {}", path.display(), e)))?
                    .len();
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                (name, path, bytes)
            }
            RestoreFrom::Remote { name } => {
                let (entry, local, bytes) = self.fetch(kind, &source_id, name.as_deref(), scratch.path())?;
                (entry.name.file_name(), local, bytes)
            }
        };

        self.checkpoint()?;
        let extracted = scratch.path().join("extracted");
        packager::unpack(&local_path, &extracted)?;

        self.checkpoint()?;
        source.restore(&extracted)?;

        info!(archive = %archive, "Restore completed");
        Ok(RestoreReport { archive, bytes_downloaded: bytes })
    }

    /// List, select and download one archive. The session is released before returning.
    fn fetch(
        &self,
        kind: SourceKind,
        source_id: &str,
        requested: Option<&str>,
        into: &Path,
    ) -> Result<(RemoteArchiveEntry, PathBuf, u64)> {
        let transport = self.config.transport()?;
        let mut session = Session::open(self.connector, transport, &self.cancel)?;

        let entries = for_source(session.list(&transport.dest_dir)?, kind, source_id);
        info!("Found {} archives for {} {}", entries.len(), kind, source_id);

        let entry = selector::select(&entries, requested).map_err(|e| match e {
            BackupError::NoArchivesAvailable(_) => {
                BackupError::NoArchivesAvailable(format!("{kind} {source_id} in {}", transport.dest_dir))
            }
            other => other,
        })?;
        info!("Selected {}", entry.remote_path);

        self.checkpoint()?;
        let local = into.join(remote_file_name(&entry.remote_path));
        let bytes = session.download(&entry.remote_path, &local)?;

        if let Err(e) = session.close() {
            warn!("Closing transport session failed: {}", e);
        }
        Ok((entry, local, bytes))
    }
}

/// Keep only entries belonging to one source
fn for_source(entries: Vec<RemoteArchiveEntry>, kind: SourceKind, source_id: &str) -> Vec<RemoteArchiveEntry> {
    entries
        .into_iter()
        .filter(|e| e.name.is_for(kind, source_id))
        .collect()
}
