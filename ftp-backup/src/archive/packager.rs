//! Builds and unpacks `.tar.gz` archives.

use super::{ArchiveName, SourceKind};
use crate::fs::walker::payload_stats;
use crate::transfer::progress::format_bytes;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A freshly written local archive. The caller decides when to delete it.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    pub name: ArchiveName,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl LocalArchive {
    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove local archive {}: {}", self.path.display(), e);
        }
    }
}

/// Package `payload` (file or directory) into `out_dir`, named for the current UTC time.
pub fn package(kind: SourceKind, source_id: &str, payload: &Path, out_dir: &Path) -> Result<LocalArchive> {
    package_at(kind, source_id, payload, out_dir, Utc::now())
}

pub fn package_at(
    kind: SourceKind,
    source_id: &str,
    payload: &Path,
    out_dir: &Path,
    now: DateTime<Utc>,
) -> Result<LocalArchive> {
    let name = ArchiveName::new(kind, source_id, now)?;

    let stats = payload_stats(payload).map_err(|e| {
        BackupError::Packaging(format!("Cannot read payload {}: {}", payload.display(), e))
    })?;
    if stats.is_empty() {
        return Err(BackupError::Packaging(format!("Payload {} is empty", payload.display())));
    }

    fs::create_dir_all(out_dir).map_err(|e| {
        BackupError::Packaging(format!("Cannot create {}: {}", out_dir.display(), e))
    })?;
    let dest = out_dir.join(name.file_name());

    info!(
        "Creating archive {} ({} files, {})",
        dest.display(),
        stats.files,
        format_bytes(stats.bytes)
    );

    if let Err(e) = write_archive(payload, &dest) {
        let _ = fs::remove_file(&dest);
        return Err(BackupError::Packaging(format!("Cannot write {}: {}", dest.display(), e)));
    }

    let size_bytes = fs::metadata(&dest)
        .map_err(|e| BackupError::Packaging(format!("Cannot stat {}: {}", dest.display(), e)))?
        .len();

    Ok(LocalArchive {
        name,
        path: dest,
        size_bytes,
    })
}

/// The payload is stored under its own basename, like `tar -C parent -czf out name`.
fn write_archive(payload: &Path, dest: &Path) -> std::io::Result<()> {
    let arc_name = payload
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("payload"));

    let file = BufWriter::new(File::create(dest)?);
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    if payload.is_dir() {
        builder.append_dir_all(&arc_name, payload)?;
    } else {
        builder.append_path_with_name(payload, &arc_name)?;
    }

    let encoder = builder.into_inner()?;
    let mut file = encoder.finish()?;
    std::io::Write::flush(&mut file)?;
    file.get_ref().sync_all()?;
    Ok(())
}

/// Extract `archive` into `dest_dir`.
pub fn unpack(archive: &Path, dest_dir: &Path) -> Result<()> {
    info!("Extracting {} into {}", archive.display(), dest_dir.display());

    let file = File::open(archive)
        .map_err(|e| BackupError::Packaging(format!("Cannot open {}: {}", archive.display(), e)))?;
    fs::create_dir_all(dest_dir).map_err(|e| {
        BackupError::Packaging(format!("Cannot create {}: {}", dest_dir.display(), e))
    })?;

    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.unpack(dest_dir)
        .map_err(|e| BackupError::Packaging(format!("Cannot extract {}: {}", archive.display(), e)))
}
