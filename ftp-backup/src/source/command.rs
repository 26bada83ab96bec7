//! External tool invocation.

use crate::utils::errors::BackupError;
use std::io;
use std::process::{Command, ExitStatus};
use tracing::info;

/// Run `cmd` to completion; `wrap` turns a failure message into the caller's error kind.
pub fn run(cmd: &mut Command, wrap: fn(String) -> BackupError) -> Result<(), BackupError> {
    info!("EXEC: {}", describe(cmd));
    let status = cmd.status().map_err(|e| wrap(spawn_failure(cmd, e)))?;
    check_status(cmd, status, wrap)
}

pub fn check_status(cmd: &Command, status: ExitStatus, wrap: fn(String) -> BackupError) -> Result<(), BackupError> {
    if status.success() {
        Ok(())
    } else {
        Err(wrap(format!(
            "{} failed ({})",
            cmd.get_program().to_string_lossy(),
            status
        )))
    }
}

pub fn spawn_failure(cmd: &Command, err: io::Error) -> String {
    let program = cmd.get_program().to_string_lossy();
    if err.kind() == io::ErrorKind::NotFound {
        format!("Binary {program} not found - install it and ensure it is on the PATH")
    } else {
        format!("Cannot start {program}: {err}")
    }
}

/// Command line for logs, with password arguments masked
pub fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    let mut mask_next = false;
    for arg in cmd.get_args() {
        let arg = arg.to_string_lossy();
        if mask_next {
            parts.push("***".to_string());
            mask_next = false;
            continue;
        }
        mask_next = arg == "--password" || arg == "-p";
        parts.push(arg.into_owned());
    }
    parts.join(" ")
}
