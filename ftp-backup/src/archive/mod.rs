//! Archive naming and packaging.
//!
//! An archive filename carries everything needed to identify a backup unit:
//! `{kind}_{source-slug}_{YYYYMMDD-HHMMSS}.tar.gz`. The remote directory listing
//! is the only record of what exists, so names must parse back losslessly.

pub mod packager;

use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Category of data being backed up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    MongoDb,
    MySql,
    Folder,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::MongoDb => "mongodb",
            SourceKind::MySql => "mysql",
            SourceKind::Folder => "folder",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mongodb" => Ok(SourceKind::MongoDb),
            "mysql" => Ok(SourceKind::MySql),
            "folder" => Ok(SourceKind::Folder),
            other => Err(BackupError::Config(format!("Unknown source kind: {other}"))),
        }
    }
}

/// Reduce a database name or folder path to a filename-safe identifier.
///
/// Characters outside `[A-Za-z0-9._-]` become `-`, runs of `-` collapse and
/// leading/trailing `-` are dropped. `/data/www` becomes `data-www`.
pub fn slugify(raw: &str) -> Result<String> {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '-'
        };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }

    let slug = slug.trim_matches('-');
    if !is_valid_slug(slug) {
        return Err(BackupError::Config(format!(
            "Source identifier {raw:?} does not produce a usable archive name"
        )));
    }
    Ok(slug.to_string())
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.chars().all(|c| c == '.')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Parsed identity of one archive. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveName {
    kind: SourceKind,
    source_id: String,
    timestamp: DateTime<Utc>,
}

impl ArchiveName {
    /// Build a name from an already-slugged source id.
    ///
    /// Sub-second precision is dropped so the name round-trips.
    pub fn new(kind: SourceKind, source_id: &str, timestamp: DateTime<Utc>) -> Result<Self> {
        if !is_valid_slug(source_id) {
            return Err(BackupError::Config(format!("Invalid source identifier slug: {source_id:?}")));
        }
        let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);
        Ok(Self {
            kind,
            source_id: source_id.to_string(),
            timestamp,
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Fixed-width timestamp field; sorts lexicographically in time order
    pub fn timestamp_field(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}{}",
            self.kind,
            self.source_id,
            self.timestamp_field(),
            ARCHIVE_SUFFIX
        )
    }

    /// Whether this archive belongs to the given source
    pub fn is_for(&self, kind: SourceKind, source_id: &str) -> bool {
        self.kind == kind && self.source_id == source_id
    }

    /// Parse a filename; `None` for anything not produced by [`ArchiveName::file_name`].
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
        let (kind, rest) = stem.split_once('_')?;
        let (source_id, timestamp) = rest.rsplit_once('_')?;

        let kind = kind.parse().ok()?;
        if timestamp.len() != TIMESTAMP_LEN || !is_valid_slug(source_id) {
            return None;
        }
        let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;

        Some(Self {
            kind,
            source_id: source_id.to_string(),
            timestamp: Utc.from_utc_datetime(&naive),
        })
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
