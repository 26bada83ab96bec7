//! Payload traversal.
//!
//! Used to size a payload before packaging and to copy an extracted folder
//! back onto its destination during restore.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

/// Summary of a payload about to be archived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadStats {
    pub files: usize,
    pub bytes: u64,
}

impl PayloadStats {
    pub fn is_empty(&self) -> bool {
        self.files == 0
    }
}

/// Walk a directory tree and collect all regular files (symlinks not followed)
pub fn walk_files(root: &Path) -> io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        files.push(FileInfo {
            size: entry.metadata()?.len(),
            path,
            relative_path,
        });
    }

    Ok(files)
}

/// Count files and bytes under `root`; a plain file counts as one entry
pub fn payload_stats(root: &Path) -> io::Result<PayloadStats> {
    let metadata = fs::metadata(root)?;
    if metadata.is_file() {
        return Ok(PayloadStats {
            files: usize::from(metadata.len() > 0),
            bytes: metadata.len(),
        });
    }

    let files = walk_files(root)?;
    Ok(PayloadStats {
        files: files.len(),
        bytes: files.iter().map(|f| f.size).sum(),
    })
}

/// Whether a directory exists and has at least one entry
pub fn dir_has_entries(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copy every file under `src` into `dest`, creating directories as needed.
/// Existing files in `dest` are overwritten. Returns the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path) -> io::Result<usize> {
    fs::create_dir_all(dest)?;

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
            fs::create_dir_all(dest.join(relative))?;
        }
    }

    let files = walk_files(src)?;
    for file in &files {
        let target = dest.join(&file.relative_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file.path, &target)?;
    }

    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_files(temp_dir.path())?;
        assert_eq!(files.len(), 0);
        assert!(payload_stats(temp_dir.path())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"12345")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"1234567")?;

        let files = walk_files(temp_dir.path())?;
        assert_eq!(files.len(), 2);

        let stats = payload_stats(temp_dir.path())?;
        assert_eq!(stats, PayloadStats { files: 2, bytes: 12 });
        Ok(())
    }

    #[test]
    fn test_payload_stats_single_file() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        let file = temp_dir.path().join("shop.sql");

        fs::write(&file, b"")?;
        assert!(payload_stats(&file)?.is_empty());

        fs::write(&file, b"CREATE TABLE t (id INT);")?;
        assert_eq!(payload_stats(&file)?.files, 1);
        Ok(())
    }

    #[test]
    fn test_dir_has_entries() -> io::Result<()> {
        let temp_dir = TempDir::new()?;
        assert!(!dir_has_entries(temp_dir.path())?);
        assert!(!dir_has_entries(&temp_dir.path().join("missing"))?);

        fs::create_dir(temp_dir.path().join("empty"))?;
        assert!(dir_has_entries(temp_dir.path())?);
        Ok(())
    }

    #[test]
    fn test_copy_tree() -> io::Result<()> {
        let src = TempDir::new()?;
        let dest = TempDir::new()?;

        fs::create_dir_all(src.path().join("a/b"))?;
        fs::create_dir(src.path().join("empty"))?;
        fs::write(src.path().join("top.txt"), b"top")?;
        fs::write(src.path().join("a/b/deep.txt"), b"deep")?;
        fs::write(dest.path().join("top.txt"), b"stale")?;

        let copied = copy_tree(src.path(), dest.path())?;
        assert_eq!(copied, 2);
        assert_eq!(fs::read(dest.path().join("top.txt"))?, b"top");
        assert_eq!(fs::read(dest.path().join("a/b/deep.txt"))?, b"deep");
        assert!(dest.path().join("empty").is_dir());
        Ok(())
    }
}
