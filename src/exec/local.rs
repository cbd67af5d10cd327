//! Shell commands on the operator machine
//!
//! Commands run through `sh -c` from the user's home directory.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{LinkError, Result};

/// What a local command produced within its grace period
pub enum ExecOutcome {
    /// Exited successfully in time; full stdout
    Completed(String),
    /// Still running; output continues line by line
    Streaming(OutputLines),
}

impl std::fmt::Debug for ExecOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecOutcome::Completed(out) => f.debug_tuple("Completed").field(out).finish(),
            ExecOutcome::Streaming(lines) => f
                .debug_struct("Streaming")
                .field("pid", &lines.id())
                .finish(),
        }
    }
}

/// Line-by-line stdout of a command that outlived its grace period.
///
/// Dropping this leaves the process running; call [`OutputLines::kill`] to
/// stop it.
pub struct OutputLines {
    command: String,
    buffered: VecDeque<String>,
    reader: BufReader<ChildStdout>,
    child: Child,
}

impl OutputLines {
    /// Next line without its terminator, `None` once stdout closes.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.buffered.pop_front() {
            return Ok(Some(strip_newline(line)));
        }
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| LinkError::io(&self.command, e))?;
        Ok((n > 0).then(|| strip_newline(line)))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| LinkError::io(&self.command, e))
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|e| LinkError::io(&self.command, e))
    }
}

fn strip_newline(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}

fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(home_dir());
    cmd
}

fn command_failed(command: &str, status: ExitStatus, stderr: String) -> LinkError {
    LinkError::Command {
        command: command.to_string(),
        stderr,
        exit_code: status.code(),
    }
}

/// Run to completion, optionally bounded by `deadline` (the process is
/// killed when it expires).
pub(crate) async fn run_to_completion(command: &str, deadline: Option<Duration>) -> Result<String> {
    debug!("local exec: {}", command);
    let child = shell(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LinkError::io(command, e))?;

    let output = match deadline {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| LinkError::CommandTimeout {
                command: command.to_string(),
                secs: limit.as_secs(),
            })?,
        None => child.wait_with_output().await,
    }
    .map_err(|e| LinkError::io(command, e))?;

    if !output.status.success() {
        return Err(command_failed(
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run with a grace period: a command that exits within `grace` is
/// reported as completed (or failed); one that keeps running is handed
/// back as a line stream.
pub(crate) async fn run_with_grace(command: &str, grace: Duration) -> Result<ExecOutcome> {
    debug!("local exec (grace {:?}): {}", grace, command);
    let mut child = shell(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| LinkError::io(command, e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LinkError::io(command, std::io::Error::other("stdout not captured")))?;
    let stderr_task: Option<JoinHandle<String>> = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        })
    });

    let mut reader = BufReader::new(stdout);
    let mut collected = VecDeque::new();

    let drained = tokio::time::timeout(grace, async {
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            collected.push_back(line);
        }
        child.wait().await
    })
    .await;

    match drained {
        Ok(status) => {
            let status = status.map_err(|e| LinkError::io(command, e))?;
            let stderr = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            if !status.success() {
                return Err(command_failed(command, status, stderr));
            }
            Ok(ExecOutcome::Completed(collected.into_iter().collect()))
        }
        Err(_) => {
            debug!("`{}` still running after {:?}, streaming output", command, grace);
            Ok(ExecOutcome::Streaming(OutputLines {
                command: command.to_string(),
                buffered: collected,
                reader,
                child,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_returns_stdout() {
        let out = run_to_completion("echo hello", None).await.unwrap();
        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn test_runs_from_home() {
        let out = run_to_completion("pwd", None).await.unwrap();
        assert_eq!(out.trim_end(), home_dir().to_string_lossy());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_command_error() {
        match run_to_completion("echo oops >&2; false", None).await {
            Err(LinkError::Command {
                stderr, exit_code, ..
            }) => {
                assert_eq!(stderr, "oops\n");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("expected command error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let err = run_to_completion("sleep 5", Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::CommandTimeout { .. }));
    }

    #[tokio::test]
    async fn test_grace_completed() {
        match run_with_grace("printf 'a\\nb\\n'", Duration::from_secs(5)).await.unwrap() {
            ExecOutcome::Completed(out) => assert_eq!(out, "a\nb\n"),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_grace_failure_reports_stderr() {
        let err = run_with_grace("echo bad >&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            LinkError::Command {
                stderr, exit_code, ..
            } => {
                assert_eq!(stderr.trim(), "bad");
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_grace_expired_streams_lines() {
        let outcome = run_with_grace("echo first; sleep 1; echo second", Duration::from_millis(300))
            .await
            .unwrap();
        let ExecOutcome::Streaming(mut lines) = outcome else {
            panic!("expected streaming outcome");
        };
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(lines.wait().await.unwrap().success());
    }
}
