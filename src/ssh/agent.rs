//! Public-key authentication through the system SSH agent
//!
//! The agent never hands out private keys. Each identity it reports is
//! offered to the server and the server's challenge is forwarded to the
//! agent for signing.

use std::future::Future;

use russh::client::Handle;
use russh::keys::agent::client::{AgentClient, AgentStream};
use russh::keys::ssh_key;
use russh::{AgentAuthError, CryptoVec, Signer};
use tracing::{debug, info, warn};

use super::client::ClientHandler;
use super::error::SshError;

type DynAgent = AgentClient<Box<dyn AgentStream + Send + Unpin + 'static>>;

/// Signs with an owned copy of the requested key so the returned future
/// does not borrow the sign request across an await point.
struct AgentSigner<'a> {
    agent: &'a mut DynAgent,
}

impl Signer for AgentSigner<'_> {
    type Error = AgentAuthError;

    fn auth_publickey_sign(
        &mut self,
        key: &ssh_key::PublicKey,
        hash_alg: Option<ssh_key::HashAlg>,
        to_sign: CryptoVec,
    ) -> impl Future<Output = Result<CryptoVec, Self::Error>> + Send {
        let key = key.clone();
        async move {
            self.agent
                .sign_request(&key, hash_alg, to_sign)
                .await
                .map_err(Into::into)
        }
    }
}

pub struct SshAgentClient {
    agent: DynAgent,
}

impl SshAgentClient {
    /// Connect through `SSH_AUTH_SOCK` (Unix) or the OpenSSH named pipe (Windows).
    pub async fn connect() -> Result<Self, SshError> {
        #[cfg(unix)]
        {
            let agent = AgentClient::connect_env().await.map_err(|e| {
                SshError::AgentNotAvailable(format!("SSH_AUTH_SOCK unusable: {}", e))
            })?;
            debug!("Connected to SSH agent via SSH_AUTH_SOCK");
            Ok(Self {
                agent: agent.dynamic(),
            })
        }

        #[cfg(windows)]
        {
            let agent = AgentClient::connect_named_pipe(r"\\.\pipe\openssh-ssh-agent")
                .await
                .map_err(|e| {
                    SshError::AgentNotAvailable(format!("OpenSSH agent pipe unusable: {}", e))
                })?;
            debug!("Connected to SSH agent via named pipe");
            Ok(Self {
                agent: agent.dynamic(),
            })
        }

        #[cfg(not(any(unix, windows)))]
        {
            Err(SshError::AgentNotAvailable(
                "SSH agent is not supported on this platform".to_string(),
            ))
        }
    }

    /// Offer every agent identity in turn.
    ///
    /// Returns `Ok(false)` when the agent is reachable but none of its keys
    /// were accepted, so the caller can move on to other methods.
    pub async fn authenticate(
        &mut self,
        handle: &mut Handle<ClientHandler>,
        username: &str,
    ) -> Result<bool, SshError> {
        let keys = self
            .agent
            .request_identities()
            .await
            .map_err(|e| SshError::AgentError(format!("Failed to list agent keys: {}", e)))?;

        if keys.is_empty() {
            debug!("SSH agent holds no keys");
            return Ok(false);
        }

        for key in &keys {
            debug!("Offering agent key {} ({})", key.comment(), key.algorithm());
            let mut signer = AgentSigner {
                agent: &mut self.agent,
            };
            match handle
                .authenticate_publickey_with(username, key.clone(), None, &mut signer)
                .await
            {
                Ok(result) if result.success() => {
                    info!("Authenticated with agent key {}", key.comment());
                    return Ok(true);
                }
                Ok(_) => debug!("Agent key {} rejected", key.comment()),
                Err(e) => warn!("Agent signing failed for {}: {}", key.comment(), e),
            }
        }

        Ok(false)
    }
}

/// Cheap pre-check; connecting may still fail.
pub fn is_agent_available() -> bool {
    #[cfg(unix)]
    {
        std::env::var_os("SSH_AUTH_SOCK").is_some()
    }

    #[cfg(windows)]
    {
        true
    }

    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_reports_missing_agent() {
        match SshAgentClient::connect().await {
            Ok(_) => assert!(is_agent_available()),
            Err(SshError::AgentNotAvailable(_)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
}
