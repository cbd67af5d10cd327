//! companion-link - one I/O layer for the operator machine and a companion computer
//!
//! File operations, shell commands and tmux sessions behave the same whether
//! they target the local machine or a robot reached over SSH. See [`Link`]
//! for the usual entry point.

pub mod config;
pub mod error;
pub mod exec;
pub mod fs;
pub mod link;
pub mod path;
pub mod remote;
pub mod ssh;
pub mod tmux;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use error::{LinkError, Result};
pub use exec::{CommandExecutor, ExecOutcome};
pub use fs::{CancellationToken, EntryFilter, FileOps};
pub use link::Link;
pub use path::{PathNormalizer, PathReference, PathScope};
pub use remote::{Backend, RemoteSession};
pub use tmux::{PaneCommand, SessionOrchestrator};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Log to a new timestamped file in `dir` and return its path.
pub fn init_file_logging(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "companion-link-{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            "companion-link {} logging to {:?}",
            env!("CARGO_PKG_VERSION"),
            path
        );
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_logging_creates_timestamped_file() {
        let dir = tempdir().unwrap();
        let path = init_file_logging(&dir.path().join("logs")).unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("companion-link-"));

        // A second install attempt is harmless
        init_logging();
    }
}
