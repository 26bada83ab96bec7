//! Picks the archive a restore run downloads.

use crate::archive::ArchiveName;
use crate::retention::newest_entry;
use crate::transport::{remote_file_name, RemoteArchiveEntry};
use crate::utils::errors::{BackupError, Result};

/// Choose an archive from a single source's listing.
///
/// With `requested` set, the entry whose parsed name equals it (a bare file
/// name or a remote path); otherwise the newest entry.
pub fn select(entries: &[RemoteArchiveEntry], requested: Option<&str>) -> Result<RemoteArchiveEntry> {
    if entries.is_empty() {
        return Err(BackupError::NoArchivesAvailable("empty listing".to_string()));
    }

    match requested {
        Some(requested) => {
            let wanted = ArchiveName::parse(remote_file_name(requested))
                .ok_or_else(|| BackupError::ArchiveNotFound(format!("{requested} is not an archive name")))?;
            entries
                .iter()
                .find(|entry| entry.name == wanted)
                .cloned()
                .ok_or_else(|| BackupError::ArchiveNotFound(requested.to_string()))
        }
        None => newest_entry(entries)
            .cloned()
            .ok_or_else(|| BackupError::NoArchivesAvailable("empty listing".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::entries_from_listing;

    fn listing(names: &[&str]) -> Vec<RemoteArchiveEntry> {
        entries_from_listing("/backups", names.iter().map(|n| (n.to_string(), None, None)))
    }

    #[test]
    fn test_latest_by_timestamp() {
        let entries = listing(&[
            "mysql_shop_20240201-020000.tar.gz",
            "mysql_shop_20240301-020000.tar.gz",
            "mysql_shop_20240101-020000.tar.gz",
        ]);
        let chosen = select(&entries, None).unwrap();
        assert_eq!(chosen.name.file_name(), "mysql_shop_20240301-020000.tar.gz");
    }

    #[test]
    fn test_february_over_january() {
        let entries = listing(&["mysql_shop_20240101-020000.tar.gz", "mysql_shop_20240201-020000.tar.gz"]);
        let chosen = select(&entries, None).unwrap();
        assert_eq!(chosen.remote_path, "/backups/mysql_shop_20240201-020000.tar.gz");
    }

    #[test]
    fn test_requested_name() {
        let entries = listing(&["mysql_shop_20240101-020000.tar.gz", "mysql_shop_20240201-020000.tar.gz"]);

        let chosen = select(&entries, Some("mysql_shop_20240101-020000.tar.gz")).unwrap();
        assert_eq!(chosen.name.file_name(), "mysql_shop_20240101-020000.tar.gz");

        let chosen = select(&entries, Some("/backups/mysql_shop_20240101-020000.tar.gz")).unwrap();
        assert_eq!(chosen.name.file_name(), "mysql_shop_20240101-020000.tar.gz");
    }

    #[test]
    fn test_requested_name_missing() {
        let entries = listing(&["mysql_shop_20240101-020000.tar.gz"]);
        let result = select(&entries, Some("mysql_shop_20230101-020000.tar.gz"));
        assert!(matches!(result, Err(BackupError::ArchiveNotFound(_))));

        let result = select(&entries, Some("garbage"));
        assert!(matches!(result, Err(BackupError::ArchiveNotFound(_))));
    }

    #[test]
    fn test_empty_listing() {
        let result = select(&[], None);
        assert!(matches!(result, Err(BackupError::NoArchivesAvailable(_))));
    }
}
