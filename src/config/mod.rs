//! Persistent settings: workspace root, remote endpoint, terminal and tmux.

pub mod storage;
pub mod types;

pub use storage::{config_dir, log_dir, settings_file, SettingsStorage, StorageError};
pub use types::{EndpointConfig, LinkSettings, Network, TmuxSettings};
