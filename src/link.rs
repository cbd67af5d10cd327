//! One handle over the active backend
//!
//! A [`Link`] is built from [`LinkSettings`]. With an endpoint configured
//! every file operation, command and tmux session targets the companion
//! computer over a single shared connection; without one they run locally.

use tracing::info;

use crate::config::{LinkSettings, SettingsStorage};
use crate::error::{LinkError, Result};
use crate::exec::CommandExecutor;
use crate::fs::FileOps;
use crate::path::PathNormalizer;
use crate::remote::Backend;
use crate::tmux::SessionOrchestrator;

#[derive(Debug, Clone)]
pub struct Link {
    settings: LinkSettings,
    backend: Backend,
    files: FileOps,
    executor: CommandExecutor,
}

impl Link {
    pub fn new(settings: LinkSettings) -> Result<Self> {
        let backend = match &settings.endpoint {
            Some(endpoint) => Backend::remote(endpoint.to_ssh_config()?),
            None => Backend::Local,
        };
        let files = FileOps::new(
            backend.clone(),
            PathNormalizer::new(settings.workspace_root.clone()),
        );
        let executor =
            CommandExecutor::new(backend.clone()).with_terminal(settings.terminal.clone());

        match backend.session() {
            Some(session) => info!("Link targets {}", session.endpoint()),
            None => info!("Link targets the local machine"),
        }

        Ok(Self {
            settings,
            backend,
            files,
            executor,
        })
    }

    /// Build from the settings file in the config directory.
    pub async fn load() -> Result<Self> {
        let storage = SettingsStorage::new().map_err(|e| LinkError::Config(e.to_string()))?;
        let settings = storage
            .load()
            .await
            .map_err(|e| LinkError::Config(e.to_string()))?;
        Self::new(settings)
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_remote(&self) -> bool {
        self.backend.is_remote()
    }

    pub fn files(&self) -> &FileOps {
        &self.files
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Orchestrator for tmux on the active backend, using the configured
    /// base index.
    pub fn orchestrator(&self) -> SessionOrchestrator {
        SessionOrchestrator::new(self.executor.clone())
            .with_base_index(self.settings.tmux.base_index)
    }

    /// Connect now instead of on first use. No-op for a local link.
    pub async fn connect(&self) -> Result<()> {
        if let Some(session) = self.backend.session() {
            session.establish().await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(session) = self.backend.session() {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_link_runs_everything_locally() {
        let dir = tempdir().unwrap();
        let mut settings = LinkSettings::default();
        settings.workspace_root = format!("{}/", dir.path().display());
        let link = Link::new(settings).unwrap();

        assert!(!link.is_remote());
        link.connect().await.unwrap();
        link.files().write_file("notes.txt", "hello").await.unwrap();
        assert_eq!(link.files().read_file("notes.txt").await.unwrap(), "hello");
        assert_eq!(link.executor().execute("echo hi").await.unwrap(), "hi\n");
        link.close().await;
    }

    #[test]
    fn test_endpoint_without_network_is_rejected() {
        let mut settings = LinkSettings::default();
        settings.endpoint = Some(EndpointConfig::new("pi"));
        assert!(matches!(Link::new(settings), Err(LinkError::Config(_))));
    }

    #[tokio::test]
    async fn test_remote_link_is_lazy() {
        let mut endpoint = EndpointConfig::new("pi");
        endpoint.add_network("wifi", "127.0.0.1");
        endpoint.port = 1;
        let mut settings = LinkSettings::default();
        settings.endpoint = Some(endpoint);

        let link = Link::new(settings).unwrap();
        assert!(link.is_remote());
        assert!(!link.backend().session().unwrap().is_connected().await);
        link.close().await;
    }
}
