//! Lazily established connection to the companion computer
//!
//! A [`RemoteSession`] owns at most one live SSH connection together with
//! its SFTP channel and the remote home directory. Callers never connect
//! explicitly: the first remote operation does, and later ones reuse it.

use std::sync::Arc;

use russh_sftp::client::SftpSession;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{LinkError, Result};
use crate::ssh::{
    exec_collect, spawn_handle_owner_task, HandleController, KnownHostsStore, PingResult,
    SshClient, SshConfig, SshError,
};

/// Handles to a live connection
#[derive(Clone)]
pub struct Connected {
    pub controller: HandleController,
    pub sftp: Arc<SftpSession>,
    /// Always ends with `/`
    pub home_dir: String,
}

pub struct RemoteSession {
    config: SshConfig,
    known_hosts: Arc<KnownHostsStore>,
    state: Mutex<Option<Connected>>,
}

impl RemoteSession {
    pub fn new(config: SshConfig) -> Self {
        let path = config
            .known_hosts_path
            .clone()
            .unwrap_or_else(KnownHostsStore::default_path);
        Self {
            known_hosts: Arc::new(KnownHostsStore::open(path)),
            config,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// `user@host` identity used in logs and errors
    pub fn endpoint(&self) -> String {
        self.config.endpoint()
    }

    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.controller.is_connected())
    }

    /// Return the live connection, connecting first if there is none.
    pub async fn establish(&self) -> Result<Connected> {
        let mut state = self.state.lock().await;
        if let Some(connected) = state.as_ref() {
            if connected.controller.is_connected() {
                return Ok(connected.clone());
            }
            debug!("Connection to {} went away, reconnecting", self.endpoint());
        }

        let connected = self.connect().await?;
        *state = Some(connected.clone());
        Ok(connected)
    }

    /// Drop the current connection and open a fresh one.
    pub async fn reconnect(&self) -> Result<Connected> {
        let mut state = self.state.lock().await;
        if let Some(old) = state.take() {
            old.controller.disconnect().await;
        }
        warn!("Re-establishing connection to {}", self.endpoint());
        let connected = self.connect().await?;
        *state = Some(connected.clone());
        Ok(connected)
    }

    /// Close the connection if one is open. Safe to call repeatedly.
    pub async fn close(&self) {
        if let Some(connected) = self.state.lock().await.take() {
            connected.controller.disconnect().await;
            info!("Closed connection to {}", self.endpoint());
        }
    }

    pub async fn home_dir(&self) -> Result<String> {
        Ok(self.establish().await?.home_dir)
    }

    /// Keepalive probe on the current connection without connecting.
    pub async fn ping(&self) -> PingResult {
        let controller = self.state.lock().await.as_ref().map(|c| c.controller.clone());
        match controller {
            Some(controller) => controller.ping().await,
            None => PingResult::IoError,
        }
    }

    async fn connect(&self) -> Result<Connected> {
        let endpoint = self.endpoint();
        let handle = SshClient::new(self.config.clone(), self.known_hosts.clone())
            .connect()
            .await
            .map_err(|e| match e {
                SshError::Timeout(_) => LinkError::Timeout {
                    endpoint: endpoint.clone(),
                    secs: self.config.timeout_secs,
                },
                other => LinkError::Connection {
                    endpoint: endpoint.clone(),
                    reason: other.to_string(),
                },
            })?;

        let connection_id = format!("{}#{}", endpoint, uuid::Uuid::new_v4().simple());
        let controller = spawn_handle_owner_task(handle, connection_id);

        match Self::open_channels(&controller).await {
            Ok((sftp, home_dir)) => {
                info!("Remote home for {} is {}", endpoint, home_dir);
                Ok(Connected {
                    controller,
                    sftp: Arc::new(sftp),
                    home_dir,
                })
            }
            Err(e) => {
                controller.disconnect().await;
                Err(LinkError::Connection {
                    endpoint,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn open_channels(
        controller: &HandleController,
    ) -> std::result::Result<(SftpSession, String), SshError> {
        let channel = controller.open_session_channel().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::Subsystem(format!("sftp request refused: {}", e)))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::Subsystem(e.to_string()))?;

        let output = exec_collect(controller, "echo ~/").await?;
        let home = output.stdout.trim();
        if home.is_empty() {
            return Err(SshError::ProtocolError(
                "remote shell did not report a home directory".to_string(),
            ));
        }
        let home_dir = if home.ends_with('/') {
            home.to_string()
        } else {
            format!("{}/", home)
        };

        Ok((sftp, home_dir))
    }
}

/// Where file and command operations run
#[derive(Clone)]
pub enum Backend {
    /// The operator machine
    Local,
    /// The companion computer
    Remote(Arc<RemoteSession>),
}

impl Backend {
    pub fn remote(config: SshConfig) -> Self {
        Backend::Remote(Arc::new(RemoteSession::new(config)))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Backend::Remote(_))
    }

    pub fn session(&self) -> Option<&Arc<RemoteSession>> {
        match self {
            Backend::Remote(session) => Some(session),
            Backend::Local => None,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Local => f.write_str("Local"),
            Backend::Remote(session) => write!(f, "Remote({})", session.endpoint()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_session() -> RemoteSession {
        let dir = std::env::temp_dir().join(format!("companion-link-kh-{}", uuid::Uuid::new_v4()));
        let mut config = SshConfig::new("127.0.0.1", "pi");
        config.port = 1;
        config.timeout_secs = 2;
        config.known_hosts_path = Some(dir.join("known_hosts"));
        RemoteSession::new(config)
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let session = unreachable_session();
        session.close().await;
        session.close().await;
        assert!(!session.is_connected().await);
        assert_eq!(session.ping().await, PingResult::IoError);
    }

    #[tokio::test]
    async fn test_failed_establish_names_endpoint() {
        let session = unreachable_session();
        match session.establish().await {
            Err(LinkError::Connection { endpoint, .. }) | Err(LinkError::Timeout { endpoint, .. }) => {
                assert_eq!(endpoint, "pi@127.0.0.1:1");
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("nothing listens on port 1"),
        }
        assert!(!session.is_connected().await);
    }
}
