//! Plain directory trees.

use super::DumpSource;
use crate::archive::{slugify, SourceKind};
use crate::fs::walker::{copy_tree, dir_has_entries};
use crate::utils::errors::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct FolderSource {
    /// Folder being backed up; names the archive
    pub path: PathBuf,
    /// Restore target, defaults to `path`
    pub dest: Option<PathBuf>,
    /// Allow restoring into a non-empty destination
    pub overwrite: bool,
}

impl FolderSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dest: None,
            overwrite: false,
        }
    }

    /// Absolute form of `path`; resolves symlinks when the folder exists
    fn absolute_path(&self) -> Result<PathBuf> {
        if let Ok(canonical) = fs::canonicalize(&self.path) {
            return Ok(canonical);
        }
        if self.path.is_absolute() {
            return Ok(self.path.clone());
        }
        std::env::current_dir()
            .map(|cwd| cwd.join(&self.path))
            .map_err(|e| BackupError::Config(format!("Cannot resolve {}: {}", self.path.display(), e)))
    }
}

/// The single top-level directory an archive extracted into
fn extracted_root(extracted: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = fs::read_dir(extracted)
        .map_err(|e| BackupError::SourceRestore(format!("Cannot read {}: {}", extracted.display(), e)))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    match entries.as_slice() {
        [only] if only.is_dir() => Ok(only.clone()),
        _ => Err(BackupError::SourceRestore(format!(
            "Expected exactly one folder in archive, found {} entries",
            entries.len()
        ))),
    }
}

impl DumpSource for FolderSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Folder
    }

    fn source_id(&self) -> Result<String> {
        slugify(&self.absolute_path()?.to_string_lossy())
    }

    /// The folder itself is the payload; nothing is copied. The work dir must
    /// live outside it or the archive would end up packing itself.
    fn dump(&self, work_dir: &Path) -> Result<PathBuf> {
        let path = fs::canonicalize(&self.path)
            .map_err(|e| BackupError::SourceDump(format!("Cannot read {}: {}", self.path.display(), e)))?;
        if !path.is_dir() {
            return Err(BackupError::SourceDump(format!("{} is not a directory", path.display())));
        }
        let work_dir = fs::canonicalize(work_dir).unwrap_or_else(|_| work_dir.to_path_buf());
        if work_dir.starts_with(&path) {
            return Err(BackupError::Config(format!(
                "BACKUP_WORK_DIR {} is inside the folder being backed up ({})",
                work_dir.display(),
                path.display()
            )));
        }
        Ok(path)
    }

    fn restore(&self, extracted: &Path) -> Result<()> {
        let root = extracted_root(extracted)?;
        let dest = match &self.dest {
            Some(dest) => dest.clone(),
            None => self.absolute_path()?,
        };

        let occupied = dir_has_entries(&dest)
            .map_err(|e| BackupError::SourceRestore(format!("Cannot read {}: {}", dest.display(), e)))?;
        if occupied && !self.overwrite {
            return Err(BackupError::SourceRestore(format!(
                "{} is not empty; pass --overwrite to restore into it",
                dest.display()
            )));
        }

        info!("Copying files to {}", dest.display());
        let copied = copy_tree(&root, &dest)
            .map_err(|e| BackupError::SourceRestore(format!("Copy into {} failed: {}", dest.display(), e)))?;
        info!("Restored {} files into {}", copied, dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn extracted_with(name: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(name);
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("index.html"), b"<h1>hi</h1>").unwrap();
        fs::write(root.join("sub/app.js"), b"run()").unwrap();
        dir
    }

    #[test]
    fn test_source_id_from_path() {
        assert_eq!(FolderSource::new("/srv/does-not-exist/www").source_id().unwrap(), "srv-does-not-exist-www");
    }

    #[test]
    fn test_dump_rejects_missing_and_files() {
        let dir = TempDir::new().unwrap();
        let missing = FolderSource::new(dir.path().join("missing"));
        assert!(matches!(missing.dump(dir.path()), Err(BackupError::SourceDump(_))));

        let file = dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(FolderSource::new(&file).dump(dir.path()), Err(BackupError::SourceDump(_))));
    }

    #[test]
    fn test_dump_refuses_work_dir_inside_folder() {
        let data = TempDir::new().unwrap();
        let nested = data.path().join("tmp/scratch");
        fs::create_dir_all(&nested).unwrap();
        let source = FolderSource::new(data.path());

        assert!(matches!(source.dump(&nested), Err(BackupError::Config(_))));
        assert!(matches!(source.dump(data.path()), Err(BackupError::Config(_))));

        let outside = TempDir::new().unwrap();
        assert_eq!(source.dump(outside.path()).unwrap(), fs::canonicalize(data.path()).unwrap());
    }

    #[test]
    fn test_restore_into_new_destination() {
        let extracted = extracted_with("www");
        let target = TempDir::new().unwrap();
        let dest = target.path().join("restored");

        let source = FolderSource {
            path: PathBuf::from("/srv/www"),
            dest: Some(dest.clone()),
            overwrite: false,
        };
        source.restore(extracted.path()).unwrap();

        assert_eq!(fs::read(dest.join("index.html")).unwrap(), b"<h1>hi</h1>");
        assert_eq!(fs::read(dest.join("sub/app.js")).unwrap(), b"run()");
    }

    #[test]
    fn test_restore_refuses_non_empty_destination() {
        let extracted = extracted_with("www");
        let target = TempDir::new().unwrap();
        fs::write(target.path().join("keep.txt"), b"mine").unwrap();

        let mut source = FolderSource {
            path: PathBuf::from("/srv/www"),
            dest: Some(target.path().to_path_buf()),
            overwrite: false,
        };
        let err = source.restore(extracted.path()).unwrap_err();
        assert!(matches!(err, BackupError::SourceRestore(_)));

        source.overwrite = true;
        source.restore(extracted.path()).unwrap();
        assert!(target.path().join("index.html").exists());
        assert!(target.path().join("keep.txt").exists());
    }

    #[test]
    fn test_restore_rejects_unexpected_layout() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("loose.txt"), b"x").unwrap();
        let err = FolderSource::new("/srv/www").restore(dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::SourceRestore(_)));
    }
}
