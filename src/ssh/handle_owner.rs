//! Handle owner task
//!
//! One task owns the `Handle<ClientHandler>`; everything else talks to it
//! through a cloneable [`HandleController`]. Dropping every controller (or
//! calling [`HandleController::disconnect`]) ends the task, which then closes
//! the SSH connection.

use std::time::Duration;

use russh::client::{Handle, Msg};
use russh::Channel;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::client::ClientHandler;
use super::error::SshError;

/// Outcome of a keepalive probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingResult {
    Ok,
    /// No answer in time; the link may recover
    Timeout,
    /// Transport is gone
    IoError,
}

pub enum HandleCommand {
    ChannelOpenSession {
        reply_tx: oneshot::Sender<Result<Channel<Msg>, russh::Error>>,
    },
    Ping {
        reply_tx: oneshot::Sender<PingResult>,
    },
    Disconnect,
}

#[derive(Clone)]
pub struct HandleController {
    cmd_tx: mpsc::Sender<HandleCommand>,
}

impl HandleController {
    /// Controller over an arbitrary command queue, for tests.
    pub fn new(cmd_tx: mpsc::Sender<HandleCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Open a session channel (exec or subsystem)
    pub async fn open_session_channel(&self) -> Result<Channel<Msg>, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HandleCommand::ChannelOpenSession { reply_tx })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx
            .await
            .map_err(|_| SshError::Disconnected)?
            .map_err(|e| SshError::ChannelError(e.to_string()))
    }

    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(HandleCommand::Disconnect).await;
    }

    pub async fn ping(&self) -> PingResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(HandleCommand::Ping { reply_tx }).await.is_err() {
            return PingResult::IoError;
        }
        reply_rx.await.unwrap_or(PingResult::IoError)
    }

    /// Whether the owner task is still running
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

/// Move `handle` into its owner task.
pub fn spawn_handle_owner_task(
    handle: Handle<ClientHandler>,
    connection_id: String,
) -> HandleController {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HandleCommand>(64);

    tokio::spawn(async move {
        #[allow(unused_mut)]
        let mut handle = handle;
        debug!("Handle owner task started for {}", connection_id);

        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                HandleCommand::ChannelOpenSession { reply_tx } => {
                    let result = handle.channel_open_session().await;
                    if reply_tx.send(result).is_err() {
                        warn!("Caller dropped before receiving session channel");
                    }
                }
                HandleCommand::Ping { reply_tx } => {
                    let result = match tokio::time::timeout(
                        Duration::from_secs(5),
                        handle.send_keepalive(true),
                    )
                    .await
                    {
                        Ok(Ok(())) => PingResult::Ok,
                        Ok(Err(russh::Error::Disconnect)) => PingResult::IoError,
                        Ok(Err(e)) => {
                            warn!("Keepalive error on {}: {}", connection_id, e);
                            PingResult::Timeout
                        }
                        Err(_) => PingResult::Timeout,
                    };
                    let _ = reply_tx.send(result);
                }
                HandleCommand::Disconnect => {
                    debug!("Disconnect requested for {}", connection_id);
                    break;
                }
            }
        }

        drain_pending_commands(&mut cmd_rx);

        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
            .await;
        info!("Connection {} closed", connection_id);
    });

    HandleController { cmd_tx }
}

/// Fail every queued command with a disconnect.
fn drain_pending_commands(cmd_rx: &mut mpsc::Receiver<HandleCommand>) {
    cmd_rx.close();

    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            HandleCommand::ChannelOpenSession { reply_tx } => {
                let _ = reply_tx.send(Err(russh::Error::Disconnect));
            }
            HandleCommand::Ping { reply_tx } => {
                let _ = reply_tx.send(PingResult::IoError);
            }
            HandleCommand::Disconnect => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_queue_reports_disconnected() {
        let (tx, rx) = mpsc::channel(1);
        let controller = HandleController::new(tx);
        drop(rx);

        assert!(!controller.is_connected());
        assert_eq!(controller.ping().await, PingResult::IoError);
        assert!(matches!(
            controller.open_session_channel().await,
            Err(SshError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_drain_answers_queued_commands() {
        let (tx, mut rx) = mpsc::channel(4);
        let (ping_tx, ping_rx) = oneshot::channel();
        let (open_tx, open_rx) = oneshot::channel();
        tx.send(HandleCommand::Ping { reply_tx: ping_tx }).await.unwrap();
        tx.send(HandleCommand::ChannelOpenSession { reply_tx: open_tx })
            .await
            .unwrap();

        drain_pending_commands(&mut rx);

        assert_eq!(ping_rx.await.unwrap(), PingResult::IoError);
        assert!(matches!(open_rx.await.unwrap(), Err(russh::Error::Disconnect)));
        assert!(tx.is_closed());
    }
}
