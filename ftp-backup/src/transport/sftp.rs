//! SFTP-over-SSH backend.

use super::{copy_error, dir_prefixes, entries_from_listing, remote_file_name, RemoteArchiveEntry, Transport};
use crate::config::TransportConfig;
use crate::transfer::progress::copy_with_progress;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Utc};
use ssh2::{ErrorCode, RenameFlags, Session, Sftp};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_FX_NO_SUCH_FILE: i32 = 2;
const LIBSSH2_FX_PERMISSION_DENIED: i32 = 3;
const LIBSSH2_FX_NO_SUCH_PATH: i32 = 10;

pub struct SftpTransport {
    session: Option<Session>,
    sftp: Option<Sftp>,
    cancel: CancellationToken,
}

impl SftpTransport {
    /// Open TCP, run the SSH handshake, authenticate and start the SFTP subsystem
    pub fn connect(config: &TransportConfig, cancel: CancellationToken) -> Result<Self> {
        let address = config.address();
        let addr = address
            .to_socket_addrs()
            .map_err(|e| BackupError::TransportConnect(format!("resolve {address}: {e}")))?
            .next()
            .ok_or_else(|| BackupError::TransportConnect(format!("resolve {address}: no addresses")))?;

        let tcp = TcpStream::connect_timeout(&addr, config.timeout).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => BackupError::TransportTimeout(format!("connect {addr}: {e}")),
            _ => BackupError::TransportConnect(format!("connect {addr}: {e}")),
        })?;

        let mut sess = Session::new()
            .map_err(|e| BackupError::TransportConnect(format!("SSH session init: {e}")))?;
        sess.set_tcp_stream(tcp);
        sess.set_timeout(u32::try_from(config.timeout.as_millis()).unwrap_or(u32::MAX));
        sess.handshake().map_err(|e| match classify("SSH handshake", e) {
            timeout @ BackupError::TransportTimeout(_) => timeout,
            other => BackupError::TransportConnect(other.to_string()),
        })?;

        let auth = match &config.private_key {
            Some(key) => sess.userauth_pubkey_file(&config.username, None, key, config.password.as_deref()),
            None => sess.userauth_password(&config.username, config.password.as_deref().unwrap_or_default()),
        };
        auth.map_err(|e| BackupError::TransportAuth(format!("SSH authentication failed for {}: {}", config.username, e)))?;

        if !sess.authenticated() {
            return Err(BackupError::TransportAuth(format!(
                "SSH authentication failed for {}",
                config.username
            )));
        }

        let sftp = sess.sftp().map_err(|e| classify("start SFTP subsystem", e))?;

        debug!("SFTP session ready");
        Ok(Self {
            session: Some(sess),
            sftp: Some(sftp),
            cancel,
        })
    }

    fn sftp(&self) -> Result<&Sftp> {
        self.sftp
            .as_ref()
            .ok_or_else(|| BackupError::TransportIo("SFTP session already closed".to_string()))
    }
}

impl Transport for SftpTransport {
    fn ensure_remote_dir(&mut self, path: &str) -> Result<()> {
        let sftp = self.sftp()?;
        for dir in dir_prefixes(path) {
            let dir_path = Path::new(&dir);
            if sftp.stat(dir_path).is_ok() {
                continue;
            }
            debug!(dir = %dir, "Creating remote directory");
            if let Err(e) = sftp.mkdir(dir_path, 0o755) {
                if sftp.stat(dir_path).is_err() {
                    return Err(classify(&format!("mkdir {dir}"), e));
                }
            }
        }
        Ok(())
    }

    fn write_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64> {
        let file = File::open(local_path)
            .map_err(|e| BackupError::TransportIo(format!("open {}: {}", local_path.display(), e)))?;
        let total = file.metadata().ok().map(|m| m.len());
        let mut reader = BufReader::new(file);

        let mut remote = self
            .sftp()?
            .create(Path::new(remote_path))
            .map_err(|e| classify(&format!("create {remote_path}"), e))?;

        let label = format!("upload {}", remote_file_name(remote_path));
        copy_with_progress(&mut reader, &mut remote, &label, total, &self.cancel)
            .map_err(|e| copy_error(remote_path, e))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.sftp()?
            .rename(
                Path::new(from),
                Path::new(to),
                Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
            )
            .map_err(|e| classify(&format!("rename {from} -> {to}"), e))
    }

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        info!("Downloading {} to {}", remote_path, local_path.display());
        let sftp = self.sftp()?;

        let mut remote = sftp
            .open(Path::new(remote_path))
            .map_err(|e| classify(&format!("open {remote_path}"), e))?;
        let total = remote.stat().ok().and_then(|s| s.size);

        let file = File::create(local_path)
            .map_err(|e| BackupError::TransportIo(format!("create {}: {}", local_path.display(), e)))?;
        let mut writer = BufWriter::new(file);

        let label = format!("download {}", remote_file_name(remote_path));
        copy_with_progress(&mut remote, &mut writer, &label, total, &self.cancel)
            .map_err(|e| copy_error(remote_path, e))
    }

    fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteArchiveEntry>> {
        let listing = self
            .sftp()?
            .readdir(Path::new(remote_dir))
            .map_err(|e| classify(&format!("readdir {remote_dir}"), e))?;
        debug!(count = listing.len(), dir = %remote_dir, "Listed remote directory");

        let files = listing.into_iter().filter(|(_, stat)| !stat.is_dir()).filter_map(|(path, stat)| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let mod_time = stat
                .mtime
                .and_then(|secs| DateTime::<Utc>::from_timestamp(i64::try_from(secs).ok()?, 0));
            Some((name, stat.size, mod_time))
        });
        Ok(entries_from_listing(remote_dir, files))
    }

    fn delete(&mut self, remote_path: &str) -> Result<()> {
        self.sftp()?
            .unlink(Path::new(remote_path))
            .map_err(|e| classify(&format!("unlink {remote_path}"), e))
    }

    fn close(&mut self) -> Result<()> {
        drop(self.sftp.take());
        if let Some(session) = self.session.take() {
            if let Err(e) = session.disconnect(None, "backup run finished", None) {
                warn!("SSH disconnect failed: {}", e);
            }
        }
        Ok(())
    }
}

fn classify(context: &str, err: ssh2::Error) -> BackupError {
    match err.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => BackupError::TransportTimeout(format!("{context}: {err}")),
        ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_FILE) | ErrorCode::SFTP(LIBSSH2_FX_NO_SUCH_PATH) => {
            BackupError::TransportNotFound(format!("{context}: {err}"))
        }
        ErrorCode::SFTP(LIBSSH2_FX_PERMISSION_DENIED) => {
            BackupError::TransportIo(format!("{context}: permission denied"))
        }
        _ => BackupError::TransportIo(format!("{context}: {err}")),
    }
}
