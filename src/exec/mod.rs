//! Command execution on whichever backend is active
//!
//! Remote commands go over an exec channel of the shared connection and
//! fail when they write anything to stderr. Local commands run through
//! `sh -c` and fail on a non-zero exit status.

mod local;
mod terminal;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

pub use local::{ExecOutcome, OutputLines};
pub use terminal::TerminalLauncher;

use crate::error::{LinkError, Result};
use crate::remote::{Backend, Connected, RemoteSession};
use crate::ssh::{exec_collect, ExecOutput};

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    backend: Backend,
    terminal: TerminalLauncher,
}

impl CommandExecutor {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            terminal: TerminalLauncher::default(),
        }
    }

    pub fn with_terminal(mut self, terminal: TerminalLauncher) -> Self {
        self.terminal = terminal;
        self
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_remote(&self) -> bool {
        self.backend.is_remote()
    }

    /// Run `command` and return its stdout.
    pub async fn execute(&self, command: &str) -> Result<String> {
        self.execute_with_deadline(command, None).await
    }

    /// Like [`execute`](Self::execute), failing with
    /// [`LinkError::CommandTimeout`] once `deadline` passes.
    pub async fn execute_with_deadline(
        &self,
        command: &str,
        deadline: Option<Duration>,
    ) -> Result<String> {
        match &self.backend {
            Backend::Local => local::run_to_completion(command, deadline).await,
            Backend::Remote(session) => execute_remote(session, command, deadline).await,
        }
    }

    /// Run on the operator machine regardless of the backend.
    ///
    /// With a `grace` period, a command still running when it expires is
    /// returned as [`ExecOutcome::Streaming`]; without one the call waits
    /// for the command to finish.
    pub async fn execute_local(&self, command: &str, grace: Option<Duration>) -> Result<ExecOutcome> {
        match grace {
            Some(grace) if !grace.is_zero() => local::run_with_grace(command, grace).await,
            _ => local::run_to_completion(command, None)
                .await
                .map(ExecOutcome::Completed),
        }
    }

    /// Open a terminal window running `command`. On a remote backend the
    /// command runs over SSH unless `force_local` is set.
    pub fn open_terminal(&self, command: Option<&str>, force_local: bool) -> Result<()> {
        let remote = match (&self.backend, force_local) {
            (Backend::Remote(session), false) => Some(session.config()),
            _ => None,
        };
        self.terminal.spawn(command, remote)
    }
}

async fn execute_remote(
    session: &RemoteSession,
    command: &str,
    deadline: Option<Duration>,
) -> Result<String> {
    let output = retry_once_if_lost(&session.endpoint(), command, |fresh| async move {
        let connected = if fresh {
            session.reconnect().await?
        } else {
            session.establish().await?
        };
        exec_once(&connected, command, deadline).await
    })
    .await?;
    remote_stdout(command, output)
}

/// Run `attempt` on the current connection and, if the connection drops
/// underneath it, once more on a fresh one. `attempt` is told which.
async fn retry_once_if_lost<F, Fut>(endpoint: &str, command: &str, mut attempt: F) -> Result<ExecOutput>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = Result<ExecOutput>>,
{
    match attempt(false).await {
        Err(e) if e.is_connection_lost() => {
            warn!(
                "Lost connection to {} running `{}` ({}), retrying once",
                endpoint, command, e
            );
            attempt(true).await
        }
        other => other,
    }
}

/// Any stderr output fails a remote command; the exit status alone does not.
fn remote_stdout(command: &str, output: ExecOutput) -> Result<String> {
    if !output.stderr.is_empty() {
        return Err(LinkError::Command {
            command: command.to_string(),
            stderr: output.stderr,
            exit_code: output.exit_code.map(|c| c as i32),
        });
    }
    Ok(output.stdout)
}

async fn exec_once(
    connected: &Connected,
    command: &str,
    deadline: Option<Duration>,
) -> Result<ExecOutput> {
    let run = exec_collect(&connected.controller, command);
    match deadline {
        Some(limit) => tokio::time::timeout(limit, run)
            .await
            .map_err(|_| LinkError::CommandTimeout {
                command: command.to_string(),
                secs: limit.as_secs(),
            })?
            .map_err(LinkError::from),
        None => run.await.map_err(LinkError::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::SshError;

    #[tokio::test]
    async fn test_local_execute_returns_stdout() {
        let executor = CommandExecutor::new(Backend::Local);
        assert_eq!(executor.execute("echo ok").await.unwrap(), "ok\n");
    }

    #[tokio::test]
    async fn test_local_false_is_command_error() {
        let executor = CommandExecutor::new(Backend::Local);
        let err = executor.execute("false").await.unwrap_err();
        assert!(matches!(err, LinkError::Command { exit_code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_execute_local_without_grace_completes() {
        let executor = CommandExecutor::new(Backend::Local);
        match executor.execute_local("echo done", None).await.unwrap() {
            ExecOutcome::Completed(out) => assert_eq!(out, "done\n"),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_applies_locally() {
        let executor = CommandExecutor::new(Backend::Local);
        let err = executor
            .execute_with_deadline("sleep 3", Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::CommandTimeout { .. }));
    }

    fn output(stdout: &str, stderr: &str, exit_code: u32) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }
    }

    fn lost() -> LinkError {
        LinkError::Ssh(SshError::Disconnected)
    }

    #[tokio::test]
    async fn test_lost_connection_is_retried_once_on_fresh_connection() {
        let mut attempts = Vec::new();
        let result = retry_once_if_lost("pi@robot", "uptime", |fresh| {
            attempts.push(fresh);
            let n = attempts.len();
            async move {
                if n == 1 {
                    Err(lost())
                } else {
                    Ok(output("up 3 days\n", "", 0))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result.stdout, "up 3 days\n");
        assert_eq!(attempts, vec![false, true]);
    }

    #[tokio::test]
    async fn test_second_loss_propagates_without_more_retries() {
        let mut attempts = 0;
        let err = retry_once_if_lost("pi@robot", "uptime", |_| {
            attempts += 1;
            async { Err::<ExecOutput, _>(lost()) }
        })
        .await
        .unwrap_err();

        assert!(err.is_connection_lost());
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let mut attempts = 0;
        let err = retry_once_if_lost("pi@robot", "uptime", |_| {
            attempts += 1;
            async {
                Err::<ExecOutput, _>(LinkError::CommandTimeout {
                    command: "uptime".into(),
                    secs: 1,
                })
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LinkError::CommandTimeout { .. }));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_remote_stderr_is_command_error() {
        let err = remote_stdout("ls /nope", output("", "ls: cannot access '/nope'\n", 2))
            .unwrap_err();
        match err {
            LinkError::Command {
                stderr, exit_code, ..
            } => {
                assert!(stderr.contains("cannot access"));
                assert_eq!(exit_code, Some(2));
            }
            other => panic!("expected command error, got {}", other),
        }

        // Stderr alone fails even a zero exit
        assert!(remote_stdout("warn", output("ok", "deprecated\n", 0)).is_err());
    }

    #[test]
    fn test_remote_nonzero_exit_without_stderr_returns_stdout() {
        assert_eq!(remote_stdout("grep -q x f", output("", "", 1)).unwrap(), "");
    }

    #[tokio::test]
    async fn test_unreachable_remote_reports_connection_error() {
        let mut config = crate::ssh::SshConfig::new("127.0.0.1", "pi");
        config.port = 1;
        config.timeout_secs = 2;
        config.known_hosts_path = Some(std::env::temp_dir().join("companion-link-test-known_hosts"));
        let executor = CommandExecutor::new(Backend::remote(config));

        let err = executor.execute("true").await.unwrap_err();
        assert!(matches!(
            err,
            LinkError::Connection { .. } | LinkError::Timeout { .. }
        ));
    }
}
