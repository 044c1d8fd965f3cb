//! Async subprocess executor with credential injection.
//!
//! Spawns the real CLI binary with the parent environment merged with the
//! credential envelope's overlay (overlay wins), captures stdout/stderr, and
//! enforces the configured timeout. The argument vector goes straight to
//! process creation; nothing is interpreted and no shell is involved.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::debug;

/// Grace period between the termination signal and the hard kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one CLI run. Also the response body shape for `POST /cli`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    /// A failed run carrying only a diagnostic on stderr.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: message.into(),
        }
    }

    pub fn ok(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Execute a CLI command as an async subprocess.
///
/// The credential is injected via `env_overlay` and never touches the
/// caller's environment. A missing binary and a timeout are reported in-band
/// with `exit_code = -1`, not as errors; the caller always gets a result.
pub async fn execute_cli(
    binary: &str,
    args: &[String],
    env_overlay: &HashMap<String, String>,
    timeout: Duration,
    stdin_data: Option<&[u8]>,
) -> CliResult {
    let mut command = Command::new(binary);
    command
        .args(args)
        .envs(env_overlay)
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return CliResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Command not found: {binary}"),
            };
        }
        Err(e) => {
            return CliResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Failed to spawn {binary}: {e}"),
            };
        }
    };

    if let Some(data) = stdin_data {
        if let Some(mut stdin) = child.stdin.take() {
            let data = data.to_vec();
            // Written concurrently so a child that never reads cannot wedge us.
            tokio::spawn(async move {
                let _ = stdin.write_all(&data).await;
            });
        }
    }

    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return CliResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Failed to wait on {binary}: {e}"),
            };
        }
        Err(_) => {
            terminate(&mut child).await;
            if let Some(task) = stdout_task {
                task.abort();
            }
            if let Some(task) = stderr_task {
                task.abort();
            }
            debug!(binary, timeout_secs = timeout.as_secs(), "subprocess timed out");
            return CliResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("Command timed out after {}s", timeout.as_secs()),
            };
        }
    };

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    CliResult {
        exit_code: exit_code_of(status),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}

/// Ask the child to exit, escalating to a hard kill after [`KILL_GRACE`].
/// The child is reaped on every path.
#[cfg(unix)]
async fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) {
    let _ = child.kill().await;
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match status.code() {
        Some(code) => code,
        None => -status.signal().unwrap_or(1),
    }
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let result = execute_cli(
            "echo",
            &["hello".to_string()],
            &no_env(),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "");
    }

    #[tokio::test]
    async fn test_captures_stderr_and_exit_code() {
        let result = execute_cli(
            "sh",
            &["-c".to_string(), "echo oops >&2; exit 3".to_string()],
            &no_env(),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "oops\n");
    }

    #[tokio::test]
    async fn test_env_overlay_injected() {
        let mut env = no_env();
        env.insert("CREDGATE_TEST_TOKEN".to_string(), "tok-123".to_string());
        let result = execute_cli(
            "sh",
            &["-c".to_string(), "printf %s \"$CREDGATE_TEST_TOKEN\"".to_string()],
            &env,
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.stdout, "tok-123");
    }

    #[tokio::test]
    async fn test_env_overlay_wins_over_parent() {
        std::env::set_var("CREDGATE_TEST_COLLIDE", "parent");
        let mut env = no_env();
        env.insert("CREDGATE_TEST_COLLIDE".to_string(), "overlay".to_string());
        let result = execute_cli(
            "sh",
            &["-c".to_string(), "printf %s \"$CREDGATE_TEST_COLLIDE\"".to_string()],
            &env,
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.stdout, "overlay");
    }

    #[tokio::test]
    async fn test_missing_binary_reported_in_band() {
        let result = execute_cli(
            "credgate-no-such-binary",
            &[],
            &no_env(),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.exit_code, -1);
        assert_eq!(
            result.stderr,
            "Command not found: credgate-no-such-binary"
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let result = execute_cli(
            "sleep",
            &["30".to_string()],
            &no_env(),
            Duration::from_secs(1),
            None,
        )
        .await;
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "Command timed out after 1s");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_stdin_forwarded() {
        let result = execute_cli(
            "cat",
            &[],
            &no_env(),
            Duration::from_secs(5),
            Some(b"piped body"),
        )
        .await;
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "piped body");
    }

    #[tokio::test]
    async fn test_invalid_utf8_replaced() {
        let result = execute_cli(
            "sh",
            &["-c".to_string(), "printf '\\377\\376 ok'".to_string()],
            &no_env(),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains('\u{FFFD}'));
        assert!(result.stdout.ends_with(" ok"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_death_maps_to_negative_code() {
        let result = execute_cli(
            "sh",
            &["-c".to_string(), "kill -9 $$".to_string()],
            &no_env(),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert_eq!(result.exit_code, -9);
    }
}
