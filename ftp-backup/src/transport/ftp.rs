//! Plain FTP backend.

use super::{copy_error, dir_prefixes, entries_from_listing, remote_file_name, RemoteArchiveEntry, Transport};
use crate::config::TransportConfig;
use crate::transfer::progress::copy_with_progress;
use crate::utils::errors::{BackupError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct FtpTransport {
    stream: Option<FtpStream>,
    /// Login directory; relative remote paths are resolved against it
    home: String,
    timeout: Duration,
    cancel: CancellationToken,
}

impl FtpTransport {
    /// Connect, log in and switch to binary mode
    pub fn connect(config: &TransportConfig, cancel: CancellationToken) -> Result<Self> {
        let addr = resolve(&config.host, config.port)?;

        let mut stream = FtpStream::connect_timeout(addr, config.timeout)
            .map_err(|e| classify(&format!("connect {addr}"), e))?;
        set_stream_timeout(stream.get_ref(), config.timeout)?;

        let password = config.password.as_deref().unwrap_or_default();
        stream
            .login(config.username.as_str(), password)
            .map_err(|e| match e {
                FtpError::ConnectionError(io) => BackupError::from_transport_io("login", io),
                other => BackupError::TransportAuth(format!("login as {} rejected: {}", config.username, other)),
            })?;

        stream.set_mode(if config.passive_mode { Mode::Passive } else { Mode::Active });
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| classify("set binary mode", e))?;

        let home = stream.pwd().unwrap_or_else(|_| "/".to_string());
        debug!(passive = config.passive_mode, home = %home, "FTP session ready");
        Ok(Self {
            stream: Some(stream),
            home,
            timeout: config.timeout,
            cancel,
        })
    }

    fn stream(&mut self) -> Result<&mut FtpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| BackupError::TransportIo("FTP session already closed".to_string()))
    }
}

impl Transport for FtpTransport {
    fn ensure_remote_dir(&mut self, path: &str) -> Result<()> {
        let path = absolute(&self.home, path);
        let stream = self.stream()?;
        for dir in dir_prefixes(&path) {
            if stream.cwd(&dir).is_ok() {
                continue;
            }
            debug!(dir = %dir, "Creating remote directory");
            if let Err(e) = stream.mkdir(&dir) {
                // Another client may have created it in between.
                if stream.cwd(&dir).is_err() {
                    return Err(classify(&format!("MKD {dir}"), e));
                }
            }
        }
        Ok(())
    }

    fn write_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64> {
        let remote_path = absolute(&self.home, remote_path);
        let remote_path = remote_path.as_str();
        let file = File::open(local_path)
            .map_err(|e| BackupError::TransportIo(format!("open {}: {}", local_path.display(), e)))?;
        let total = file.metadata().ok().map(|m| m.len());
        let mut reader = BufReader::new(file);
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let stream = self.stream()?;

        let mut data = stream
            .put_with_stream(remote_path)
            .map_err(|e| classify(&format!("STOR {remote_path}"), e))?;
        set_stream_timeout(data.get_ref(), timeout)?;

        let label = format!("upload {}", remote_file_name(remote_path));
        let sent = copy_with_progress(&mut reader, &mut data, &label, total, &cancel)
            .map_err(|e| copy_error(remote_path, e))?;

        stream
            .finalize_put_stream(data)
            .map_err(|e| classify(&format!("STOR {remote_path}"), e))?;
        Ok(sent)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let from = absolute(&self.home, from);
        let to = absolute(&self.home, to);
        self.stream()?
            .rename(from.as_str(), to.as_str())
            .map_err(|e| classify(&format!("RNFR {from} RNTO {to}"), e))
    }

    fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let remote_path = absolute(&self.home, remote_path);
        let remote_path = remote_path.as_str();
        info!("Downloading {} to {}", remote_path, local_path.display());
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let stream = self.stream()?;

        let mut data = stream
            .retr_as_stream(remote_path)
            .map_err(|e| classify(&format!("RETR {remote_path}"), e))?;
        set_stream_timeout(data.get_ref(), timeout)?;

        let file = File::create(local_path)
            .map_err(|e| BackupError::TransportIo(format!("create {}: {}", local_path.display(), e)))?;
        let mut writer = BufWriter::new(file);

        let label = format!("download {}", remote_file_name(remote_path));
        let received = copy_with_progress(&mut data, &mut writer, &label, None, &cancel)
            .map_err(|e| copy_error(remote_path, e))?;

        stream
            .finalize_retr_stream(data)
            .map_err(|e| classify(&format!("RETR {remote_path}"), e))?;
        Ok(received)
    }

    fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteArchiveEntry>> {
        let dir = absolute(&self.home, remote_dir);
        let names = match self.stream()?.nlst(Some(dir.as_str())) {
            Ok(names) => names,
            // Some servers answer 550 for an empty directory.
            Err(FtpError::UnexpectedResponse(resp)) if resp.status == Status::FileUnavailable => Vec::new(),
            Err(e) => return Err(classify(&format!("NLST {remote_dir}"), e)),
        };
        debug!(count = names.len(), dir = %remote_dir, "Listed remote directory");
        Ok(entries_from_listing(
            remote_dir,
            names.into_iter().map(|name| (name, None, None)),
        ))
    }

    fn delete(&mut self, remote_path: &str) -> Result<()> {
        let remote_path = absolute(&self.home, remote_path);
        let remote_path = remote_path.as_str();
        self.stream()?
            .rm(remote_path)
            .map_err(|e| classify(&format!("DELE {remote_path}"), e))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.quit() {
                warn!("FTP QUIT failed: {}", e);
            }
        }
        Ok(())
    }
}

fn absolute(home: &str, path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        super::join_remote(home, path)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| BackupError::TransportConnect(format!("resolve {host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| BackupError::TransportConnect(format!("resolve {host}:{port}: no addresses")))
}

fn set_stream_timeout(stream: &std::net::TcpStream, timeout: Duration) -> Result<()> {
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| BackupError::TransportIo(format!("set socket timeout: {e}")))
}

fn classify(context: &str, err: FtpError) -> BackupError {
    match err {
        FtpError::ConnectionError(io) => BackupError::from_transport_io(context, io),
        FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable => {
            BackupError::TransportNotFound(format!("{context}: {}", String::from_utf8_lossy(&resp.body).trim()))
        }
        FtpError::UnexpectedResponse(resp) if resp.status == Status::NotLoggedIn => {
            BackupError::TransportAuth(format!("{context}: {}", String::from_utf8_lossy(&resp.body).trim()))
        }
        other => BackupError::TransportIo(format!("{context}: {other}")),
    }
}
