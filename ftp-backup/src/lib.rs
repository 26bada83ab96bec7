//! ftp-backup library
//!
//! Dumps MongoDB, MySQL or plain folders into timestamped `.tar.gz` archives,
//! ships them to an FTP or SFTP server, prunes old archives and restores the
//! latest (or a named) one.

pub mod archive;
pub mod cli;
pub mod config;
pub mod fs;
pub mod orchestrator;
pub mod retention;
pub mod selector;
pub mod shutdown;
pub mod source;
pub mod transfer;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
