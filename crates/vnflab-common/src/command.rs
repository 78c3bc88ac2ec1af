//! Invocation of external tools.
//!
//! Every kernel and container operation goes through `ip`, `tc`, `nsenter`
//! or `docker`. Children are killed when their future is dropped, so a
//! timeout around any of these calls never leaves a stray process behind.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{VnfError, VnfResult};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Exit code, or -1 when the process was killed by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Output of a command that succeeded with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Whether the command exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program args...`, capturing its output.
///
/// # Errors
///
/// Returns an error only if the process could not be spawned.
pub async fn run(program: &str, args: &[&str]) -> VnfResult<CommandOutput> {
    tracing::trace!(command = %command_line(program, args), "Running command");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| VnfError::CommandFailed {
            command: command_line(program, args),
            stderr: e.to_string(),
        })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Run `program args...`, failing with the captured stderr on a non-zero exit.
///
/// # Errors
///
/// Returns [`VnfError::CommandFailed`] if the command cannot be spawned or
/// exits unsuccessfully.
pub async fn run_checked(program: &str, args: &[&str]) -> VnfResult<CommandOutput> {
    let output = run(program, args).await?;
    if !output.success() {
        return Err(VnfError::CommandFailed {
            command: command_line(program, args),
            stderr: output.stderr,
        });
    }
    Ok(output)
}

/// Run `program args...` with inherited stdio and return its exit code.
///
/// Used for long-running workloads whose output belongs on the terminal.
///
/// # Errors
///
/// Returns an error only if the process could not be spawned or waited on.
pub async fn run_attached(program: &str, args: &[&str]) -> VnfResult<i32> {
    tracing::debug!(command = %command_line(program, args), "Running attached command");

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| VnfError::CommandFailed {
            command: command_line(program, args),
            stderr: e.to_string(),
        })?;

    Ok(status.code().unwrap_or(-1))
}

/// Force-remove a docker container, logging instead of failing.
///
/// Used to clear stale names and half-created containers; a container that
/// does not exist is not an error.
pub async fn discard_container(name: &str) {
    match run("docker", &["rm", "-f", name]).await {
        Ok(out) if out.success() => tracing::debug!(container = name, "Container discarded"),
        Ok(out) => tracing::debug!(container = name, stderr = %out.stderr, "Nothing to discard"),
        Err(e) => tracing::debug!(container = name, error = %e, "Could not discard container"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = run("sh", &["-c", "echo hello; exit 3"]).await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn checked_failure_carries_stderr() {
        let err = run_checked("sh", &["-c", "echo boom >&2; exit 1"])
            .await
            .unwrap_err();
        match err {
            VnfError::CommandFailed { command, stderr } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        assert!(run("vnflab-definitely-missing", &[]).await.is_err());
    }

    #[tokio::test]
    async fn discarding_missing_container_is_quiet() {
        discard_container("vnflab-never-created").await;
    }

    #[tokio::test]
    async fn attached_returns_exit_code() {
        assert_eq!(run_attached("sh", &["-c", "exit 7"]).await.unwrap(), 7);
    }
}
