//! Configuration management for the backup tool.
//!
//! Built once at process start from environment variables and passed down by
//! reference. Nothing reads the environment after this point. Transport
//! settings are only validated when a run needs the remote store, so restoring
//! a local archive works without any `FTP_*` variables.

use crate::utils::errors::{BackupError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DEST_DIR: &str = "/backups";
const DEFAULT_RETENTION_DAYS: u32 = 7;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Parsed transport settings, or why they are unusable
    transport: std::result::Result<TransportConfig, String>,
    pub retention: RetentionPolicy,

    /// Directory for local archives and scratch space
    pub work_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Remote store protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Ftp,
    Sftp,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Ftp => 21,
            Protocol::Sftp => 22,
        }
    }
}

impl FromStr for Protocol {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ftp" => Ok(Protocol::Ftp),
            "sftp" => Ok(Protocol::Sftp),
            other => Err(BackupError::Config(format!(
                "Unsupported FTP_PROTOCOL {other} (expected ftp or sftp)"
            ))),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ftp => f.write_str("ftp"),
            Protocol::Sftp => f.write_str("sftp"),
        }
    }
}

#[derive(Clone)]
pub struct TransportConfig {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,

    /// Password (FTP, or SFTP password auth)
    pub password: Option<String>,

    /// Private key for SFTP public-key auth
    pub private_key: Option<PathBuf>,

    /// Remote directory holding the archives
    pub dest_dir: String,

    /// FTP passive mode; ignored for SFTP
    pub passive_mode: bool,

    /// Deadline applied to every network operation
    pub timeout: Duration,
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key)
            .field("dest_dir", &self.dest_dir)
            .field("passive_mode", &self.passive_mode)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// How long archives are kept on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// 0 keeps everything
    pub window_days: u32,
}

impl RetentionPolicy {
    pub fn new(window_days: u32) -> Self {
        Self { window_days }
    }

    pub fn keeps_everything(&self) -> bool {
        self.window_days == 0
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

impl AppConfig {
    /// Load configuration from the process environment. The caller loads `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let window_days = match get("RETENTION_DAYS") {
            Some(v) => parse_number::<u32>("RETENTION_DAYS", &v)?,
            None => DEFAULT_RETENTION_DAYS,
        };

        let transport = TransportConfig::from_lookup(&get).map_err(|e| match e {
            BackupError::Config(message) => message,
            other => other.to_string(),
        });

        Ok(Self {
            transport,
            retention: RetentionPolicy::new(window_days),
            work_dir: get("BACKUP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Transport settings; a `Config` error when they are missing or invalid
    pub fn transport(&self) -> Result<&TransportConfig> {
        self.transport
            .as_ref()
            .map_err(|message| BackupError::Config(message.clone()))
    }
}

impl TransportConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let protocol = match get("FTP_PROTOCOL") {
            Some(v) => v.parse()?,
            None => Protocol::Ftp,
        };

        let host = get("FTP_HOST").ok_or_else(|| missing("FTP_HOST"))?;
        let username = get("FTP_USER").ok_or_else(|| missing("FTP_USER"))?;
        let password = get("FTP_PASSWORD");
        let private_key = get("SFTP_PRIVATE_KEY").map(PathBuf::from);

        match (protocol, &password, &private_key) {
            (_, Some(_), _) => {}
            (Protocol::Sftp, None, Some(_)) => {}
            (Protocol::Sftp, None, None) => {
                return Err(BackupError::Config(
                    "Missing FTP_PASSWORD or SFTP_PRIVATE_KEY".to_string(),
                ))
            }
            (Protocol::Ftp, None, _) => return Err(missing("FTP_PASSWORD")),
        }

        let port = match get("FTP_PORT") {
            Some(v) => parse_number::<u16>("FTP_PORT", &v)?,
            None => protocol.default_port(),
        };

        let passive_mode = match get("FTP_PASSIVE") {
            Some(v) => parse_bool("FTP_PASSIVE", &v)?,
            None => true,
        };

        let timeout_secs = match get("FTP_TIMEOUT") {
            Some(v) => parse_number::<u64>("FTP_TIMEOUT", &v)?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(BackupError::Config("FTP_TIMEOUT must be greater than 0".to_string()));
        }

        let dest_dir = get("FTP_DEST_DIR").unwrap_or_else(|| DEFAULT_DEST_DIR.to_string());

        Ok(Self {
            protocol,
            host,
            port,
            username,
            password,
            private_key,
            dest_dir,
            passive_mode,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn missing(key: &str) -> BackupError {
    BackupError::Config(format!("Missing {key} env var"))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BackupError::Config(format!("{key} is not a valid number: {value}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BackupError::Config(format!("{key} is not a valid boolean: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("FTP_HOST", "backup.example.com"),
        ("FTP_USER", "backup"),
        ("FTP_PASSWORD", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.transport().unwrap().protocol, Protocol::Ftp);
        assert_eq!(config.transport().unwrap().port, 21);
        assert_eq!(config.transport().unwrap().dest_dir, "/backups");
        assert!(config.transport().unwrap().passive_mode);
        assert_eq!(config.transport().unwrap().timeout, Duration::from_secs(30));
        assert_eq!(config.retention.window_days, 7);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_sftp_default_port_and_key_auth() {
        let config = AppConfig::from_lookup(lookup(&[
            ("FTP_HOST", "backup.example.com"),
            ("FTP_USER", "backup"),
            ("FTP_PROTOCOL", "SFTP"),
            ("SFTP_PRIVATE_KEY", "/root/.ssh/id_ed25519"),
        ]))
        .unwrap();
        assert_eq!(config.transport().unwrap().protocol, Protocol::Sftp);
        assert_eq!(config.transport().unwrap().port, 22);
        assert!(config.transport().unwrap().password.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("FTP_PORT", "2121"),
            ("FTP_PASSIVE", "no"),
            ("RETENTION_DAYS", "0"),
            ("FTP_DEST_DIR", "/srv/archives"),
            ("FTP_TIMEOUT", "5"),
        ]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.transport().unwrap().port, 2121);
        assert!(!config.transport().unwrap().passive_mode);
        assert!(config.retention.keeps_everything());
        assert_eq!(config.transport().unwrap().dest_dir, "/srv/archives");
        assert_eq!(config.transport().unwrap().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_credentials() {
        let config = AppConfig::from_lookup(lookup(&[("FTP_HOST", "h"), ("FTP_USER", "u")])).unwrap();
        assert!(matches!(config.transport(), Err(BackupError::Config(_))));

        let config = AppConfig::from_lookup(lookup(&[("FTP_USER", "u"), ("FTP_PASSWORD", "p")])).unwrap();
        match config.transport() {
            Err(BackupError::Config(message)) => assert_eq!(message, "Missing FTP_HOST env var"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_empty_environment_still_loads() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.retention, RetentionPolicy::default());
        assert_eq!(config.work_dir, std::env::temp_dir());
        assert!(config.transport().is_err());
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("FTP_PROTOCOL", "scp"),
            ("FTP_PORT", "http"),
            ("FTP_PASSIVE", "maybe"),
            ("RETENTION_DAYS", "-1"),
            ("FTP_TIMEOUT", "0"),
        ] {
            let mut pairs = BASE.to_vec();
            pairs.push((key, value));
            let result = AppConfig::from_lookup(lookup(&pairs)).and_then(|c| c.transport().cloned());
            assert!(matches!(result, Err(BackupError::Config(_))), "{key}={value}");
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = AppConfig::from_lookup(lookup(BASE)).unwrap();
        let rendered = format!("{:?}", config.transport().unwrap());
        assert!(!rendered.contains("secret"));
    }
}
