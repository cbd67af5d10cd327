//! One-shot command execution over an exec channel

use russh::ChannelMsg;
use tracing::debug;

use super::error::SshError;
use super::handle_owner::HandleController;

/// Everything a remote command produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<u32>,
}

/// Run `command` on a fresh session channel and collect its output.
///
/// The channel is read until the server closes it so an exit status sent
/// after EOF is not lost. Callers wanting a deadline wrap this future.
pub async fn exec_collect(
    controller: &HandleController,
    command: &str,
) -> Result<ExecOutput, SshError> {
    let mut channel = controller.open_session_channel().await?;

    debug!("exec: {}", command);
    channel
        .exec(true, command)
        .await
        .map_err(|e| SshError::ChannelError(format!("exec request failed: {}", e)))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    let output = ExecOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    };
    debug!(
        "exec finished: exit={:?} stdout={}B stderr={}B",
        output.exit_code,
        output.stdout.len(),
        output.stderr.len()
    );
    Ok(output)
}
