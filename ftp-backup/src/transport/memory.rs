//! In-memory transport for exercising runs without a server.

use super::{copy_error, dir_prefixes, entries_from_listing, Connector, RemoteArchiveEntry, Transport};
use crate::config::TransportConfig;
use crate::transfer::progress::copy_with_progress;
use crate::utils::errors::{BackupError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,

    /// Refuse to connect with this error message
    pub fail_connect: Option<String>,
    /// Drop the connection once an upload would exceed this many bytes
    pub fail_upload_after: Option<usize>,
    /// Cancel the run once an upload has written this many bytes
    pub cancel_upload_after: Option<usize>,
    /// Refuse every rename
    pub fail_rename: bool,
    /// Every path passed to `delete`, in order
    pub delete_calls: Vec<String>,
    /// Remote paths whose deletion is refused
    pub fail_delete: BTreeSet<String>,
    /// Remote paths whose download is refused
    pub fail_download: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<Mutex<MemoryStore>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap()
    }

    pub fn put(&self, remote_path: &str, data: &[u8]) {
        self.store().files.insert(remote_path.to_string(), data.to_vec());
    }

    pub fn file_names(&self) -> Vec<String> {
        self.store().files.keys().cloned().collect()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, _config: &TransportConfig, cancel: &CancellationToken) -> Result<Box<dyn Transport>> {
        let mut store = self.store();
        if let Some(message) = &store.fail_connect {
            return Err(BackupError::TransportConnect(message.clone()));
        }
        store.sessions_opened += 1;
        Ok(Box::new(MemoryTransport {
            store: Arc::clone(&self.store),
            cancel: cancel.clone(),
        }))
    }
}

pub struct MemoryTransport {
    store: Arc<Mutex<MemoryStore>>,
    cancel: CancellationToken,
}

/// Appends to one remote file as chunks arrive, like a data connection
struct RemoteWriter<'a> {
    store: &'a Mutex<MemoryStore>,
    path: &'a str,
    cancel: &'a CancellationToken,
}

impl Write for RemoteWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut store = self.store.lock().unwrap();
        let written = store.files.get(self.path).map_or(0, Vec::len) + buf.len();
        if store.fail_upload_after.is_some_and(|limit| written > limit) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"));
        }
        store.files.entry(self.path.to_string()).or_default().extend_from_slice(buf);
        if store.cancel_upload_after.is_some_and(|limit| written >= limit) {
            self.cancel.cancel();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MemoryTransport {
    fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap()
    }
}

impl Transport for MemoryTransport {
    fn ensure_remote_dir(&mut self, path: &str) -> Result<()> {
        let mut store = self.store();
        for prefix in dir_prefixes(path) {
            store.dirs.insert(prefix);
        }
        Ok(())
    }

    fn write_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64> {
        let mut reader = File::open(local_path)
            .map_err(|e| BackupError::TransportIo(format!("read {}: {}", local_path.display(), e)))?;
        self.store().files.insert(remote_path.to_string(), Vec::new());

        let mut writer = RemoteWriter {
            store: &self.store,
            path: remote_path,
            cancel: &self.cancel,
        };
        copy_with_progress(&mut reader, &mut writer, remote_path, None, &self.cancel)
            .map_err(|e| copy_error(remote_path, e))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut store = self.store();
        if store.fail_rename {
            return Err(BackupError::TransportIo(format!("rename {from} -> {to}: permission denied")));
        }
        let data = store
            .files
            .remove(from)
            .ok_or_else(|| BackupError::TransportNotFound(from.to_string()))?;
        store.files.insert(to.to_string(), data);
        Ok(())
    }

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let store = self.store();
        if store.fail_download.contains(remote_path) {
            return Err(BackupError::TransportIo(format!("connection reset while downloading {remote_path}")));
        }
        let data = store
            .files
            .get(remote_path)
            .ok_or_else(|| BackupError::TransportNotFound(remote_path.to_string()))?;
        std::fs::write(local_path, data)
            .map_err(|e| BackupError::TransportIo(format!("write {}: {}", local_path.display(), e)))?;
        Ok(data.len() as u64)
    }

    fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteArchiveEntry>> {
        let prefix = format!("{}/", remote_dir.trim_end_matches('/'));
        let store = self.store();
        let listing = store
            .files
            .iter()
            .filter_map(|(path, data)| {
                let name = path.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| (name.to_string(), Some(data.len() as u64), None))
            })
            .collect::<Vec<_>>();
        Ok(entries_from_listing(remote_dir, listing))
    }

    fn delete(&mut self, remote_path: &str) -> Result<()> {
        let mut store = self.store();
        store.delete_calls.push(remote_path.to_string());
        if store.fail_delete.contains(remote_path) {
            return Err(BackupError::TransportIo(format!("permission denied: {remote_path}")));
        }
        store
            .files
            .remove(remote_path)
            .map(|_| ())
            .ok_or_else(|| BackupError::TransportNotFound(remote_path.to_string()))
    }

    fn close(&mut self) -> Result<()> {
        self.store().sessions_closed += 1;
        Ok(())
    }
}
