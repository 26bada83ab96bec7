//! MongoDB via `mongodump` / `mongorestore`.

use super::{command, DumpSource};
use crate::archive::{slugify, SourceKind};
use crate::utils::errors::{BackupError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Source id used when every database is dumped
pub const ALL_DATABASES: &str = "all";

#[derive(Clone)]
pub struct MongoParams {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub auth_db: String,
}

impl std::fmt::Debug for MongoParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("auth_db", &self.auth_db)
            .finish()
    }
}

impl MongoParams {
    fn connection_args(&self, cmd: &mut Command) {
        cmd.args(["--host", self.host.as_str(), "--port", self.port.to_string().as_str()]);
    }

    /// Credentials are only passed when both user and password are set
    fn auth_args(&self, cmd: &mut Command) {
        if let (Some(user), Some(password)) = (&self.user, &self.password) {
            cmd.args([
                "--username",
                user.as_str(),
                "--password",
                password.as_str(),
                "--authenticationDatabase",
                self.auth_db.as_str(),
            ]);
        }
    }
}

#[derive(Debug, Clone)]
pub struct MongoSource {
    pub params: MongoParams,
    /// `None` dumps (or restores) every database
    pub db: Option<String>,
    /// Drop collections before restoring
    pub drop: bool,
}

impl MongoSource {
    fn dump_command(&self, out_dir: &Path) -> Command {
        let mut cmd = Command::new("mongodump");
        self.params.connection_args(&mut cmd);
        cmd.arg("--out").arg(out_dir);
        if let Some(db) = &self.db {
            cmd.args(["--db", db.as_str()]);
        }
        self.params.auth_args(&mut cmd);
        cmd
    }

    fn restore_command(&self, dump_dir: &Path) -> Command {
        let mut cmd = Command::new("mongorestore");
        if self.drop {
            cmd.arg("--drop");
        }
        self.params.connection_args(&mut cmd);
        if let Some(db) = &self.db {
            cmd.args(["--nsInclude", format!("{db}.*").as_str()]);
        }
        self.params.auth_args(&mut cmd);
        cmd.arg(dump_dir);
        cmd
    }
}

impl DumpSource for MongoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MongoDb
    }

    fn source_id(&self) -> Result<String> {
        slugify(self.db.as_deref().unwrap_or(ALL_DATABASES))
    }

    fn dump(&self, work_dir: &Path) -> Result<PathBuf> {
        let out_dir = work_dir.join("dump");
        command::run(&mut self.dump_command(&out_dir), BackupError::SourceDump)?;
        Ok(out_dir)
    }

    fn restore(&self, extracted: &Path) -> Result<()> {
        let dump_dir = extracted.join("dump");
        if !dump_dir.is_dir() {
            return Err(BackupError::SourceRestore(format!(
                "Archive does not contain a dump directory (looked in {})",
                extracted.display()
            )));
        }
        command::run(&mut self.restore_command(&dump_dir), BackupError::SourceRestore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::command::describe;

    fn source(db: Option<&str>, auth: bool) -> MongoSource {
        MongoSource {
            params: MongoParams {
                host: "mongo.internal".to_string(),
                port: 27017,
                user: auth.then(|| "admin".to_string()),
                password: auth.then(|| "s3cret".to_string()),
                auth_db: "admin".to_string(),
            },
            db: db.map(str::to_string),
            drop: true,
        }
    }

    #[test]
    fn test_source_id() {
        assert_eq!(source(Some("shop"), false).source_id().unwrap(), "shop");
        assert_eq!(source(None, false).source_id().unwrap(), "all");
    }

    #[test]
    fn test_dump_command() {
        let cmd = source(Some("shop"), true).dump_command(Path::new("/tmp/w/dump"));
        assert_eq!(
            describe(&cmd),
            "mongodump --host mongo.internal --port 27017 --out /tmp/w/dump --db shop \
             --username admin --password *** --authenticationDatabase admin"
        );
    }

    #[test]
    fn test_dump_command_without_credentials() {
        let cmd = source(None, false).dump_command(Path::new("/tmp/w/dump"));
        assert_eq!(describe(&cmd), "mongodump --host mongo.internal --port 27017 --out /tmp/w/dump");
    }

    #[test]
    fn test_restore_command() {
        let cmd = source(Some("shop"), false).restore_command(Path::new("/tmp/x/dump"));
        assert_eq!(
            describe(&cmd),
            "mongorestore --drop --host mongo.internal --port 27017 --nsInclude shop.* /tmp/x/dump"
        );
    }

    #[test]
    fn test_restore_requires_dump_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = source(None, false).restore(dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::SourceRestore(_)));
    }
}
