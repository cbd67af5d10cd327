//! Settings storage
//!
//! Settings live in `~/.companion-link/settings.json`, logs next to them in
//! `~/.companion-link/logs`.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::LinkSettings;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn config_dir() -> Result<PathBuf, StorageError> {
    dirs::home_dir()
        .map(|home| home.join(".companion-link"))
        .ok_or(StorageError::NoConfigDir)
}

pub fn log_dir() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("logs"))
}

pub fn settings_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("settings.json"))
}

pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: settings_file()?,
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Defaults when the file does not exist yet
    pub async fn load(&self) -> Result<LinkSettings, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {:?}, using defaults", self.path);
                Ok(LinkSettings::default())
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Written to a sibling temp file and renamed into place
    pub async fn save(&self, settings: &LinkSettings) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(settings)?;

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.path).await?;

        tracing::info!("Settings saved to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let temp = tempdir().unwrap();
        let storage = SettingsStorage::with_path(temp.path().join("settings.json"));

        let settings = storage.load().await.unwrap();
        assert_eq!(settings.workspace_root, "~/");
        assert!(settings.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_round_trips() {
        let temp = tempdir().unwrap();
        let storage = SettingsStorage::with_path(temp.path().join("nested/settings.json"));

        let mut settings = LinkSettings::default();
        settings.workspace_root = "~/ros2_ws/".to_string();
        let mut endpoint = EndpointConfig::new("pi");
        endpoint.add_network("wifi", "192.168.1.20");
        settings.endpoint = Some(endpoint);
        storage.save(&settings).await.unwrap();

        let loaded = storage.load().await.unwrap();
        assert_eq!(loaded.workspace_root, "~/ros2_ws/");
        let endpoint = loaded.endpoint.unwrap();
        assert_eq!(endpoint.selected().unwrap().address, "192.168.1.20");
        assert!(!storage.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SettingsStorage::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Json(_)));
    }
}
