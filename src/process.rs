//! # External Process Runner
//!
//! Spawns ffmpeg / ffprobe / cwebp with a hard time limit. A child that
//! outlives its limit is killed; the caller gets `CompressError::Timeout`.
//! A non-zero exit is not an error here, callers inspect `status`.

use crate::error::{CompressError, CompressResult};
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Run a tool to completion (async), capturing stdout and stderr.
pub async fn run_tool(program: &Path, args: &[String], limit: Duration) -> CompressResult<Output> {
    debug!("Running {} {:?}", program.display(), args);
    let start_time = Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    // Dropping the wait future on timeout drops the child, and kill_on_drop reaps it
    let output = tokio::time::timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| {
            warn!("{} timed out after {:?}", program.display(), limit);
            CompressError::Timeout { secs: limit.as_secs() }
        })??;

    debug!(
        "{} exited with {:?} in {:?}",
        program.display(),
        output.status.code(),
        start_time.elapsed()
    );
    Ok(output)
}

/// Blocking variant for code already running on a blocking thread.
///
/// Output streams are discarded; tools driven this way write to a file.
pub fn run_tool_blocking(program: &Path, args: &[String], limit: Duration) -> CompressResult<std::process::ExitStatus> {
    debug!("Running (blocking) {} {:?}", program.display(), args);
    let mut child = std::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            warn!("{} timed out after {:?}", program.display(), limit);
            return Err(CompressError::Timeout { secs: limit.as_secs() });
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn spawn_error(program: &Path, e: std::io::Error) -> CompressError {
    if e.kind() == std::io::ErrorKind::NotFound {
        CompressError::MissingDependency(format!("{} is not installed", program.display()))
    } else {
        CompressError::Io(e)
    }
}

/// Last lines of a tool's stderr, for diagnostics
pub fn stderr_tail(output: &Output, lines: usize) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let collected: Vec<&str> = stderr.lines().rev().take(lines).collect();
    collected.into_iter().rev().collect::<Vec<_>>().join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::args;

    #[tokio::test]
    async fn test_missing_binary_is_missing_dependency() {
        let result = run_tool(Path::new("/nonexistent/tool-xyz"), &[], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CompressError::MissingDependency(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_returned() {
        let output = run_tool(Path::new("/bin/sh"), &args!["-c", "echo boom >&2; exit 3"], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(stderr_tail(&output, 1), "boom");
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let result = run_tool(Path::new("/bin/sh"), &args!["-c", "sleep 5"], Duration::from_millis(100)).await;
        assert!(matches!(result, Err(CompressError::Timeout { .. })));
    }

    #[test]
    fn test_blocking_timeout() {
        let result = run_tool_blocking(Path::new("/bin/sh"), &args!["-c", "sleep 5"], Duration::from_millis(100));
        assert!(result.unwrap_err().is_timeout());
    }

    #[test]
    fn test_blocking_success() {
        let status = run_tool_blocking(Path::new("/bin/sh"), &args!["-c", "exit 0"], Duration::from_secs(5)).unwrap();
        assert!(status.success());
    }
}
