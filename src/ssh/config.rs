//! SSH connection parameters for the companion computer

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Seconds allowed for TCP connect plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// SSH connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote host address (IP or name)
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    #[serde(default)]
    pub auth: AuthMethod,

    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    /// Overrides `~/.ssh/known_hosts`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// `user@host` or `user@host:port` when the port is not 22.
    pub fn endpoint(&self) -> String {
        if self.port == 22 {
            format!("{}@{}", self.username, self.host)
        } else {
            format!("{}@{}:{}", self.username, self.host, self.port)
        }
    }
}

/// Authentication methods supported
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Agent keys first, then the default identity files in `~/.ssh`
    #[default]
    Auto,

    Password { password: String },

    /// SSH key authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },

    Agent,
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }
}

/// What to do with a host key the known_hosts file has never seen.
///
/// A key that differs from the recorded one is rejected under every
/// policy except `AcceptAny`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Reject unknown hosts
    Strict,
    /// Accept unknown hosts and record their key
    #[default]
    TrustOnFirstUse,
    /// Skip verification entirely
    AcceptAny,
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            auth: AuthMethod::Auto,
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            host_key_policy: HostKeyPolicy::TrustOnFirstUse,
            known_hosts_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_formatting() {
        let mut config = SshConfig::new("192.168.1.20", "pi");
        assert_eq!(config.endpoint(), "pi@192.168.1.20");
        config.port = 2222;
        assert_eq!(config.endpoint(), "pi@192.168.1.20:2222");
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: SshConfig =
            serde_json::from_str(r#"{"host":"10.0.0.2","username":"pi"}"#).unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.timeout_secs, 5);
        assert!(matches!(config.auth, AuthMethod::Auto));
        assert_eq!(config.host_key_policy, HostKeyPolicy::TrustOnFirstUse);
    }

    #[test]
    fn test_auth_method_tagging() {
        let json = serde_json::to_string(&AuthMethod::key("/home/me/.ssh/id_ed25519", None)).unwrap();
        assert!(json.contains(r#""type":"key""#));
        let parsed: AuthMethod = serde_json::from_str(r#"{"type":"agent"}"#).unwrap();
        assert!(matches!(parsed, AuthMethod::Agent));
    }
}
