//! Settings document types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LinkError, Result};
use crate::exec::TerminalLauncher;
use crate::path::HOME_SHORTHAND;
use crate::ssh::{AuthMethod, HostKeyPolicy, SshConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::tmux::DEFAULT_SESSION_NAME;

/// One way of reaching the companion computer (wifi, ethernet, radio link)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub address: String,
}

/// The remote endpoint: who to log in as and over which network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub username: String,

    #[serde(default)]
    pub networks: Vec<Network>,

    /// Index into `networks`
    #[serde(default)]
    pub selected_network: Option<usize>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub auth: AuthMethod,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl EndpointConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            networks: Vec::new(),
            selected_network: None,
            port: default_port(),
            auth: AuthMethod::default(),
            connect_timeout_secs: default_connect_timeout(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
        }
    }

    /// Append a network. The first one added becomes the selection.
    pub fn add_network(&mut self, name: impl Into<String>, address: impl Into<String>) -> usize {
        self.networks.push(Network {
            name: name.into(),
            address: address.into(),
        });
        if self.selected_network.is_none() {
            self.selected_network = Some(0);
        }
        self.networks.len() - 1
    }

    pub fn network_index(&self, name: &str) -> Option<usize> {
        self.networks.iter().position(|n| n.name == name)
    }

    pub fn select_network(&mut self, index: usize) -> Result<()> {
        if index >= self.networks.len() {
            return Err(LinkError::Config(format!(
                "network index {} out of range ({} configured)",
                index,
                self.networks.len()
            )));
        }
        self.selected_network = Some(index);
        Ok(())
    }

    /// Select by name, keeping the current selection when `name` is unknown.
    pub fn select_network_by_name(&mut self, name: &str) -> Option<&Network> {
        match self.network_index(name) {
            Some(index) => self.selected_network = Some(index),
            None => warn!(
                "Unknown network '{}', keeping {:?}",
                name,
                self.selected().map(|n| n.name.as_str())
            ),
        }
        self.selected()
    }

    pub fn selected(&self) -> Option<&Network> {
        self.selected_network.and_then(|i| self.networks.get(i))
    }

    /// Connection parameters for the selected network.
    pub fn to_ssh_config(&self) -> Result<SshConfig> {
        let network = self
            .selected()
            .ok_or_else(|| LinkError::Config("no network selected".to_string()))?;
        Ok(SshConfig {
            host: network.address.clone(),
            port: self.port,
            username: self.username.clone(),
            auth: self.auth.clone(),
            timeout_secs: self.connect_timeout_secs,
            host_key_policy: self.host_key_policy,
            known_hosts_path: self.known_hosts_path.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxSettings {
    #[serde(default = "default_session_name")]
    pub session_name: String,
    /// Must match the target's `base-index` and `pane-base-index`
    #[serde(default = "default_base_index")]
    pub base_index: u32,
}

fn default_session_name() -> String {
    DEFAULT_SESSION_NAME.to_string()
}

fn default_base_index() -> u32 {
    1
}

impl Default for TmuxSettings {
    fn default() -> Self {
        Self {
            session_name: default_session_name(),
            base_index: default_base_index(),
        }
    }
}

/// Everything persisted in `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Base for relative paths, `~/` meaning the active backend's home
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// `None` selects the local backend
    #[serde(default)]
    pub endpoint: Option<EndpointConfig>,

    #[serde(default)]
    pub terminal: TerminalLauncher,

    #[serde(default)]
    pub tmux: TmuxSettings,
}

fn default_workspace_root() -> String {
    HOME_SHORTHAND.to_string()
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            endpoint: None,
            terminal: TerminalLauncher::default(),
            tmux: TmuxSettings::default(),
        }
    }
}

impl LinkSettings {
    pub fn is_remote(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointConfig {
        let mut endpoint = EndpointConfig::new("pi");
        endpoint.add_network("wifi", "192.168.1.20");
        endpoint.add_network("radio", "10.0.0.2");
        endpoint
    }

    #[test]
    fn test_first_network_is_selected() {
        let endpoint = endpoint();
        assert_eq!(endpoint.selected_network, Some(0));
        assert_eq!(endpoint.selected().unwrap().address, "192.168.1.20");
    }

    #[test]
    fn test_select_network_rules() {
        let mut endpoint = endpoint();
        assert!(endpoint.select_network(2).is_err());
        endpoint.select_network(1).unwrap();
        assert_eq!(endpoint.selected().unwrap().name, "radio");

        // Unknown name keeps the last selection
        let kept = endpoint.select_network_by_name("ethernet").unwrap();
        assert_eq!(kept.name, "radio");
        assert_eq!(endpoint.select_network_by_name("wifi").unwrap().name, "wifi");
    }

    #[test]
    fn test_to_ssh_config_uses_selection() {
        let mut endpoint = endpoint();
        endpoint.port = 2222;
        endpoint.select_network(1).unwrap();
        let config = endpoint.to_ssh_config().unwrap();
        assert_eq!(config.endpoint(), "pi@10.0.0.2:2222");
        assert_eq!(config.timeout_secs, 5);

        assert!(EndpointConfig::new("pi").to_ssh_config().is_err());
    }

    #[test]
    fn test_settings_defaults_from_empty_document() {
        let settings: LinkSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.workspace_root, "~/");
        assert!(!settings.is_remote());
        assert_eq!(settings.tmux.session_name, "companion");
        assert_eq!(settings.tmux.base_index, 1);
        assert_eq!(settings.terminal.program, "gnome-terminal");
    }
}
