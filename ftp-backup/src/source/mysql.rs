//! MySQL via `mysqldump` / `mysql`.
//!
//! The password travels in `MYSQL_PWD` so it never shows up in `ps`.

use super::{command, DumpSource};
use crate::archive::{slugify, SourceKind};
use crate::utils::errors::{BackupError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::info;

#[derive(Clone)]
pub struct MySqlParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for MySqlParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl MySqlParams {
    fn command(&self, program: &str) -> Command {
        let mut cmd = Command::new(program);
        cmd.args([
            "--host",
            self.host.as_str(),
            "--port",
            self.port.to_string().as_str(),
            "--user",
            self.user.as_str(),
        ]);
        if let Some(password) = &self.password {
            cmd.env("MYSQL_PWD", password);
        }
        cmd
    }
}

#[derive(Debug, Clone)]
pub struct MySqlSource {
    pub params: MySqlParams,
    pub db: String,
    /// Consistent snapshot for InnoDB tables
    pub single_transaction: bool,
}

impl MySqlSource {
    fn dump_command(&self) -> Command {
        let mut cmd = self.params.command("mysqldump");
        if self.single_transaction {
            cmd.arg("--single-transaction");
        }
        cmd.arg(&self.db);
        cmd
    }

    fn restore_command(&self) -> Command {
        let mut cmd = self.params.command("mysql");
        cmd.arg(&self.db);
        cmd
    }
}

/// First `*.sql` file (by name) directly inside `dir`
pub fn find_sql_file(dir: &Path) -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

impl DumpSource for MySqlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MySql
    }

    fn source_id(&self) -> Result<String> {
        slugify(&self.db)
    }

    fn dump(&self, work_dir: &Path) -> Result<PathBuf> {
        let dump_file = work_dir.join(format!("{}.sql", self.source_id()?));
        let out = File::create(&dump_file)
            .map_err(|e| BackupError::SourceDump(format!("Cannot create {}: {}", dump_file.display(), e)))?;

        let mut cmd = self.dump_command();
        cmd.stdout(Stdio::from(out));

        info!("Running mysqldump for {}", self.db);
        info!("EXEC: {}", command::describe(&cmd));
        let status = cmd
            .status()
            .map_err(|e| BackupError::SourceDump(command::spawn_failure(&cmd, e)))?;
        command::check_status(&cmd, status, BackupError::SourceDump)?;

        Ok(dump_file)
    }

    fn restore(&self, extracted: &Path) -> Result<()> {
        let sql_file = find_sql_file(extracted).ok_or_else(|| {
            BackupError::SourceRestore(format!("No .sql file found in {}", extracted.display()))
        })?;
        let input = File::open(&sql_file)
            .map_err(|e| BackupError::SourceRestore(format!("Cannot open {}: {}", sql_file.display(), e)))?;

        let mut cmd = self.restore_command();
        cmd.stdin(Stdio::from(input));

        info!("Importing {} into {}", sql_file.display(), self.db);
        command::run(&mut cmd, BackupError::SourceRestore)
    }
}
