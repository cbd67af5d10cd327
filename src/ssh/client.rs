//! SSH client: connect, verify the host key, authenticate

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use tracing::{debug, info, warn};

use super::agent::{is_agent_available, SshAgentClient};
use super::config::{AuthMethod, HostKeyPolicy, SshConfig};
use super::error::SshError;
use super::known_hosts::{HostKeyVerification, KnownHostsStore};

/// Identity files tried by [`AuthMethod::Auto`], in order.
const DEFAULT_IDENTITIES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

pub struct SshClient {
    config: SshConfig,
    known_hosts: Arc<KnownHostsStore>,
}

impl SshClient {
    pub fn new(config: SshConfig, known_hosts: Arc<KnownHostsStore>) -> Self {
        Self {
            config,
            known_hosts,
        }
    }

    /// Connect and authenticate, returning the raw russh handle.
    pub async fn connect(self) -> Result<Handle<ClientHandler>, SshError> {
        let endpoint = self.config.endpoint();
        info!("Connecting to {}", endpoint);

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler {
            host: self.config.host.clone(),
            port: self.config.port,
            policy: self.config.host_key_policy,
            known_hosts: self.known_hosts.clone(),
        };

        let mut handle = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            client::connect(
                Arc::new(ssh_config),
                (self.config.host.as_str(), self.config.port),
                handler,
            ),
        )
        .await
        .map_err(|_| {
            SshError::Timeout(format!(
                "no handshake with {} within {}s",
                endpoint, self.config.timeout_secs
            ))
        })?
        .map_err(|e| match e {
            SshError::HostKeyRejected(_) => e,
            other => SshError::ConnectionFailed(other.to_string()),
        })?;

        debug!("SSH handshake completed with {}", endpoint);

        let authenticated = match &self.config.auth {
            AuthMethod::Password { password } => handle
                .authenticate_password(&self.config.username, password)
                .await
                .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?
                .success(),
            AuthMethod::Key {
                key_path,
                passphrase,
            } => {
                authenticate_with_key(
                    &mut handle,
                    &self.config.username,
                    &expand_tilde(key_path),
                    passphrase.as_deref(),
                )
                .await?
            }
            AuthMethod::Agent => {
                let mut agent = SshAgentClient::connect().await?;
                agent.authenticate(&mut handle, &self.config.username).await?
            }
            AuthMethod::Auto => authenticate_auto(&mut handle, &self.config.username).await?,
        };

        if !authenticated {
            return Err(SshError::AuthenticationFailed(format!(
                "server rejected credentials for {}",
                endpoint
            )));
        }

        info!("Connection successful: {}", endpoint);
        Ok(handle)
    }
}

async fn authenticate_with_key(
    handle: &mut Handle<ClientHandler>,
    username: &str,
    key_path: &Path,
    passphrase: Option<&str>,
) -> Result<bool, SshError> {
    let key = russh::keys::load_secret_key(key_path, passphrase)
        .map_err(|e| SshError::KeyError(format!("{}: {}", key_path.display(), e)))?;
    let key = PrivateKeyWithHashAlg::new(Arc::new(key), None);

    let result: AuthResult = handle
        .authenticate_publickey(username, key)
        .await
        .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;
    Ok(result.success())
}

/// Agent identities, then unencrypted default identity files.
async fn authenticate_auto(
    handle: &mut Handle<ClientHandler>,
    username: &str,
) -> Result<bool, SshError> {
    if is_agent_available() {
        match SshAgentClient::connect().await {
            Ok(mut agent) => {
                if agent.authenticate(handle, username).await? {
                    return Ok(true);
                }
            }
            Err(e) => debug!("Skipping agent: {}", e),
        }
    }

    let Some(ssh_dir) = dirs::home_dir().map(|h| h.join(".ssh")) else {
        return Ok(false);
    };

    for name in DEFAULT_IDENTITIES {
        let path = ssh_dir.join(name);
        if !path.exists() {
            continue;
        }
        match authenticate_with_key(handle, username, &path, None).await {
            Ok(true) => return Ok(true),
            Ok(false) => debug!("Identity {} rejected", path.display()),
            Err(SshError::KeyError(e)) => debug!("Skipping identity: {}", e),
            Err(e) => return Err(e),
        }
    }

    Ok(false)
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// russh callbacks; only host key verification is handled.
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Arc<KnownHostsStore>,
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        if self.policy == HostKeyPolicy::AcceptAny {
            warn!(
                "Host key verification disabled for {}:{} ({})",
                self.host,
                self.port,
                KnownHostsStore::fingerprint(server_public_key)
            );
            return Ok(true);
        }

        match self.known_hosts.verify(&self.host, self.port, server_public_key) {
            HostKeyVerification::Verified => Ok(true),
            HostKeyVerification::Unknown { fingerprint } => match self.policy {
                HostKeyPolicy::Strict => Err(SshError::HostKeyRejected(format!(
                    "unknown host {}:{} ({}) and strict checking is on",
                    self.host, self.port, fingerprint
                ))),
                _ => {
                    info!(
                        "First connection to {}:{}, recording host key {}",
                        self.host, self.port, fingerprint
                    );
                    if let Err(e) =
                        self.known_hosts
                            .add_host(&self.host, self.port, server_public_key)
                    {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(true)
                }
            },
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => Err(SshError::HostKeyRejected(format!(
                "key for {}:{} changed (expected {}, got {}); remove the stale entry from {}",
                self.host,
                self.port,
                expected_fingerprint,
                actual_fingerprint,
                self.known_hosts.path().display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/.ssh/id_rsa");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
        assert_eq!(expand_tilde("/etc/key"), PathBuf::from("/etc/key"));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = Arc::new(KnownHostsStore::open(dir.path().join("known_hosts")));
        let mut config = SshConfig::new("127.0.0.1", "nobody");
        // Port 1 is never an SSH server in the test environment
        config.port = 1;
        config.timeout_secs = 2;

        let err = match SshClient::new(config, known_hosts).connect().await {
            Err(e) => e,
            Ok(_) => panic!("nothing listens on port 1"),
        };
        assert!(matches!(
            err,
            SshError::ConnectionFailed(_) | SshError::Timeout(_)
        ));
    }
}
