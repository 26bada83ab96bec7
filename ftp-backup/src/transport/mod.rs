//! Remote store access.
//!
//! The orchestrator only ever talks to a [`Session`], which wraps one of the
//! protocol backends behind the [`Transport`] trait. Protocol dispatch happens
//! once, in [`NetworkConnector`].

pub mod ftp;
#[cfg(test)]
pub mod memory;
pub mod sftp;

use crate::archive::ArchiveName;
use crate::config::{Protocol, TransportConfig};
use crate::transfer::progress::CopyError;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One parseable archive found in the remote directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArchiveEntry {
    pub name: ArchiveName,
    pub remote_path: String,
    pub size_bytes: Option<u64>,
    pub mod_time: Option<DateTime<Utc>>,
}

/// Capabilities every backend provides identically.
///
/// Backends only supply primitives; [`upload_atomic`] composes `write_file`,
/// `rename` and `delete` into an upload that never leaves a partial file at
/// its final path. `download` and `delete` fail with `TransportNotFound` when
/// the file is absent.
pub trait Transport: Send {
    fn ensure_remote_dir(&mut self, path: &str) -> Result<()>;

    /// Stream `local_path` into `remote_path`, replacing any existing file.
    /// Stops with `Cancelled` between chunks once the run is cancelled.
    fn write_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64>;

    /// Move `from` to `to`, replacing `to` if it exists
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64>;

    /// Entries that do not parse as archive names are skipped.
    fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteArchiveEntry>>;

    fn delete(&mut self, remote_path: &str) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Opens authenticated transports.
pub trait Connector {
    fn connect(&self, config: &TransportConfig, cancel: &CancellationToken) -> Result<Box<dyn Transport>>;
}

/// Connects to a real FTP or SFTP server
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkConnector;

impl Connector for NetworkConnector {
    fn connect(&self, config: &TransportConfig, cancel: &CancellationToken) -> Result<Box<dyn Transport>> {
        info!(
            "Connecting to {}://{}@{}",
            config.protocol,
            config.username,
            config.address()
        );
        match config.protocol {
            Protocol::Ftp => Ok(Box::new(ftp::FtpTransport::connect(config, cancel.clone())?)),
            Protocol::Sftp => Ok(Box::new(sftp::SftpTransport::connect(config, cancel.clone())?)),
        }
    }
}

/// An open transport that is closed exactly once, on every exit path.
pub struct Session {
    inner: Box<dyn Transport>,
    closed: bool,
}

impl Session {
    pub fn open(connector: &dyn Connector, config: &TransportConfig, cancel: &CancellationToken) -> Result<Self> {
        Ok(Self {
            inner: connector.connect(config, cancel)?,
            closed: false,
        })
    }

    pub fn ensure_remote_dir(&mut self, path: &str) -> Result<()> {
        self.inner.ensure_remote_dir(path)
    }

    pub fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<u64> {
        upload_atomic(self.inner.as_mut(), local_path, remote_path)
    }

    pub fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        self.inner.download(remote_path, local_path)
    }

    pub fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteArchiveEntry>> {
        self.inner.list(remote_dir)
    }

    pub fn delete(&mut self, remote_path: &str) -> Result<()> {
        self.inner.delete(remote_path)
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.inner.close()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.inner.close() {
                warn!("Failed to close transport session: {}", e);
            }
        }
    }
}

/// Write to a hidden temp sibling, then rename it into place. On any failure,
/// cancellation included, the temp file is removed and the error returned.
pub fn upload_atomic(transport: &mut dyn Transport, local_path: &Path, remote_path: &str) -> Result<u64> {
    let temp_path = temp_remote_path(remote_path);
    info!("Uploading {} to {}", local_path.display(), remote_path);

    let result = transport
        .write_file(local_path, &temp_path)
        .and_then(|sent| transport.rename(&temp_path, remote_path).map(|_| sent));

    if let Err(e) = &result {
        debug!("Upload of {} failed ({}), removing {}", remote_path, e, temp_path);
        match transport.delete(&temp_path) {
            Ok(()) => {}
            Err(cleanup) if cleanup.is_not_found() => {}
            Err(cleanup) => warn!("Could not remove partial upload {}: {}", temp_path, cleanup),
        }
    }
    result
}

/// Map a streamed copy failure onto the transport error taxonomy
pub(crate) fn copy_error(remote_path: &str, err: CopyError) -> BackupError {
    match err {
        CopyError::Cancelled => BackupError::Cancelled,
        CopyError::Read(e) | CopyError::Write(e) => {
            BackupError::from_transport_io(&format!("transfer {remote_path}"), e)
        }
    }
}

/// Join a remote directory and a file name with `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Last path component of a remote path
pub fn remote_file_name(remote_path: &str) -> &str {
    remote_path.rsplit('/').next().unwrap_or(remote_path)
}

/// Hidden sibling an upload is written to before being renamed into place
pub fn temp_remote_path(remote_path: &str) -> String {
    match remote_path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/.{name}.part"),
        None => format!(".{remote_path}.part"),
    }
}

/// Directory prefixes of `path`, shallowest first: `/a/b` → `["/a", "/a/b"]`
pub fn dir_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();

    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(part);
        prefixes.push(current.clone());
    }

    prefixes
}

/// Build entries from raw directory names, skipping anything that is not an archive
pub fn entries_from_listing<I>(remote_dir: &str, listing: I) -> Vec<RemoteArchiveEntry>
where
    I: IntoIterator<Item = (String, Option<u64>, Option<DateTime<Utc>>)>,
{
    listing
        .into_iter()
        .filter_map(|(raw, size_bytes, mod_time)| {
            let file_name = remote_file_name(&raw);
            let name = ArchiveName::parse(file_name)?;
            Some(RemoteArchiveEntry {
                remote_path: join_remote(remote_dir, file_name),
                name,
                size_bytes,
                mod_time,
            })
        })
        .collect()
}
