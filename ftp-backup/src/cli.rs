//! Command line surface.
//!
//! Database connection settings are flags that fall back to the `MONGO_*` and
//! `MYSQL_*` environment variables, so a `.env` file can carry them.

use crate::orchestrator::{Orchestrator, RestoreFrom};
use crate::source::{DumpSource, FolderSource, MongoParams, MongoSource, MySqlParams, MySqlSource};
use crate::transfer::progress::format_bytes;
use crate::utils::errors::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ftp-backup", author, version, about = "Back up MongoDB, MySQL or folders to an FTP/SFTP server")]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dump MongoDB and upload the archive
    Mongodb {
        /// Database to dump; every database when omitted
        #[arg(long)]
        db: Option<String>,

        #[command(flatten)]
        conn: MongoArgs,
    },

    /// Dump a MySQL database and upload the archive
    Mysql {
        #[arg(long)]
        db: String,

        /// Skip `--single-transaction` (needed for MyISAM-only dumps with locking)
        #[arg(long)]
        no_single_transaction: bool,

        #[command(flatten)]
        conn: MySqlArgs,
    },

    /// Archive a folder and upload it
    Folder {
        #[arg(long)]
        path: PathBuf,
    },

    /// Download an archive and restore it
    Restore {
        #[command(subcommand)]
        target: RestoreTarget,
    },
}

#[derive(Subcommand, Debug)]
pub enum RestoreTarget {
    Mongodb {
        #[arg(long)]
        db: Option<String>,

        /// Keep existing collections instead of dropping them first
        #[arg(long)]
        no_drop: bool,

        #[command(flatten)]
        archive: ArchiveChoice,

        #[command(flatten)]
        conn: MongoArgs,
    },

    Mysql {
        #[arg(long)]
        db: String,

        #[command(flatten)]
        archive: ArchiveChoice,

        #[command(flatten)]
        conn: MySqlArgs,
    },

    Folder {
        /// Folder the backup was taken from
        #[arg(long)]
        path: PathBuf,

        /// Restore somewhere else than the original path
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Allow restoring into a non-empty destination
        #[arg(long)]
        overwrite: bool,

        #[command(flatten)]
        archive: ArchiveChoice,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ArchiveChoice {
    /// Remote archive file name (default: newest)
    #[arg(long)]
    pub name: Option<String>,

    /// Restore from a local archive file instead of the remote store
    #[arg(long, value_name = "FILE", conflicts_with = "name")]
    pub archive: Option<PathBuf>,
}

impl From<ArchiveChoice> for RestoreFrom {
    fn from(choice: ArchiveChoice) -> Self {
        match choice.archive {
            Some(path) => RestoreFrom::LocalArchive(path),
            None => RestoreFrom::Remote { name: choice.name },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MongoArgs {
    #[arg(long = "mongo-host", env = "MONGO_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "mongo-port", env = "MONGO_PORT", default_value_t = 27017)]
    pub port: u16,

    #[arg(long = "mongo-user", env = "MONGO_USER")]
    pub user: Option<String>,

    #[arg(long = "mongo-password", env = "MONGO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long = "mongo-auth-db", env = "MONGO_AUTH_DB", default_value = "admin")]
    pub auth_db: String,
}

impl From<MongoArgs> for MongoParams {
    fn from(args: MongoArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
            auth_db: args.auth_db,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MySqlArgs {
    #[arg(long = "mysql-host", env = "MYSQL_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "mysql-port", env = "MYSQL_PORT", default_value_t = 3306)]
    pub port: u16,

    #[arg(long = "mysql-user", env = "MYSQL_USER", default_value = "root")]
    pub user: String,

    #[arg(long = "mysql-password", env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl From<MySqlArgs> for MySqlParams {
    fn from(args: MySqlArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            user: args.user,
            password: args.password,
        }
    }
}

/// A resolved invocation, ready to run on a worker thread
pub enum Job {
    Backup(Box<dyn DumpSource + Send>),
    Restore(Box<dyn DumpSource + Send>, RestoreFrom),
}

impl Command {
    pub fn into_job(self) -> Job {
        match self {
            Command::Mongodb { db, conn } => Job::Backup(Box::new(MongoSource {
                params: conn.into(),
                db,
                drop: false,
            })),
            Command::Mysql {
                db,
                no_single_transaction,
                conn,
            } => Job::Backup(Box::new(MySqlSource {
                params: conn.into(),
                db,
                single_transaction: !no_single_transaction,
            })),
            Command::Folder { path } => Job::Backup(Box::new(FolderSource::new(path))),
            Command::Restore { target } => target.into_job(),
        }
    }
}

impl RestoreTarget {
    fn into_job(self) -> Job {
        match self {
            RestoreTarget::Mongodb {
                db,
                no_drop,
                archive,
                conn,
            } => Job::Restore(
                Box::new(MongoSource {
                    params: conn.into(),
                    db,
                    drop: !no_drop,
                }),
                archive.into(),
            ),
            RestoreTarget::Mysql { db, archive, conn } => Job::Restore(
                Box::new(MySqlSource {
                    params: conn.into(),
                    db,
                    single_transaction: true,
                }),
                archive.into(),
            ),
            RestoreTarget::Folder {
                path,
                dest,
                overwrite,
                archive,
            } => Job::Restore(Box::new(FolderSource { path, dest, overwrite }), archive.into()),
        }
    }
}

impl Job {
    pub fn run(&self, orchestrator: &Orchestrator<'_>) -> Result<()> {
        match self {
            Job::Backup(source) => {
                let report = orchestrator.backup(source.as_ref())?;
                info!(
                    "Backup {} stored at {} ({}), {} old archives deleted, {} deletions failed",
                    report.archive,
                    report.remote_path,
                    format_bytes(report.bytes_uploaded),
                    report.retention.deleted_count(),
                    report.retention.failed_count()
                );
            }
            Job::Restore(source, from) => {
                let report = orchestrator.restore(source.as_ref(), from.clone())?;
                info!(
                    "Restored {} ({})",
                    report.archive,
                    format_bytes(report.bytes_downloaded)
                );
            }
        }
        Ok(())
    }
}
