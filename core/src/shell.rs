//! Local command execution

use crate::{Error, Result};
use std::path::Path;
use tracing::{debug, instrument};

/// Run a program on the host and return its stdout
///
/// A nonzero exit status is reported as `Error::CommandFailed` carrying
/// the program's stderr.
#[instrument(skip(args))]
pub async fn run(program: &str, args: &[&str]) -> Result<String> {
    run_in(program, args, None).await
}

/// Run a program with an explicit working directory
pub async fn run_in(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    debug!(program = %program, args = ?args, "Executing locally");

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| Error::CommandFailed(format!("Failed to execute {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::CommandFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run("echo", &["hello"]).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_nonzero_is_command_failed() {
        let err = run("sh", &["-c", "echo boom >&2; exit 3"]).await.unwrap_err();
        match err {
            Error::CommandFailed(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let err = run("definitely-not-a-real-binary-guardctl", &[]).await.unwrap_err();
        assert!(matches!(err, Error::CommandFailed(_)));
    }
}
