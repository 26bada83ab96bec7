//! Data sources: produce a payload to archive, or consume an extracted one.

pub mod command;
pub mod folder;
pub mod mongodb;
pub mod mysql;

use crate::archive::SourceKind;
use crate::utils::errors::Result;
use std::path::{Path, PathBuf};

pub use folder::FolderSource;
pub use mongodb::{MongoParams, MongoSource};
pub use mysql::{MySqlParams, MySqlSource};

/// A backup-able data source.
///
/// `dump` returns the payload path (file or directory) to package; it may
/// live inside `work_dir`, which the caller removes afterwards. `restore`
/// receives the directory an archive of this source was extracted into.
pub trait DumpSource {
    fn kind(&self) -> SourceKind;

    /// Filename-safe identifier used in archive names
    fn source_id(&self) -> Result<String>;

    fn dump(&self, work_dir: &Path) -> Result<PathBuf>;

    fn restore(&self, extracted: &Path) -> Result<()>;
}
