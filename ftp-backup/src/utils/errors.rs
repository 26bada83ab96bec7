//! Error taxonomy for backup and restore runs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Source dump failed: {0}")]
    SourceDump(String),

    #[error("Source restore failed: {0}")]
    SourceRestore(String),

    #[error("Packaging error: {0}")]
    Packaging(String),

    #[error("Transport authentication failed: {0}")]
    TransportAuth(String),

    #[error("Transport connection failed: {0}")]
    TransportConnect(String),

    #[error("Transport timed out: {0}")]
    TransportTimeout(String),

    #[error("Transport I/O error: {0}")]
    TransportIo(String),

    #[error("Remote file not found: {0}")]
    TransportNotFound(String),

    #[error("Archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("No archives available for {0}")]
    NoArchivesAvailable(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl BackupError {
    /// Process exit code reported for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            BackupError::Config(_) => 2,
            BackupError::SourceDump(_) => 10,
            BackupError::SourceRestore(_) => 11,
            BackupError::Packaging(_) => 20,
            BackupError::TransportAuth(_) => 30,
            BackupError::TransportConnect(_) => 31,
            BackupError::TransportTimeout(_) => 32,
            BackupError::TransportIo(_) => 33,
            BackupError::TransportNotFound(_) => 34,
            BackupError::ArchiveNotFound(_) => 40,
            BackupError::NoArchivesAvailable(_) => 41,
            BackupError::Cancelled => 130,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackupError::TransportNotFound(_))
    }

    /// Classify a socket-level error raised while talking to the remote store.
    pub fn from_transport_io(context: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                BackupError::TransportTimeout(format!("{context}: {err}"))
            }
            std::io::ErrorKind::NotFound => BackupError::TransportNotFound(format!("{context}: {err}")),
            _ => BackupError::TransportIo(format!("{context}: {err}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
