//! Filesystem primitives on the operator machine

use std::time::UNIX_EPOCH;

use tokio::fs;

use super::attributes::FileAttributes;
use super::{Entry, EntryKind};
use crate::error::{LinkError, Result};
use crate::path::join_path;

pub(super) async fn list_entries(dir: &str) -> Result<Vec<Entry>> {
    let mut read_dir = fs::read_dir(dir).await.map_err(|e| LinkError::io(dir, e))?;
    let mut entries = Vec::new();

    while let Some(entry) = read_dir.next_entry().await.map_err(|e| LinkError::io(dir, e))? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = join_path(dir, &name);
        let link = entry
            .file_type()
            .await
            .map(|t| t.is_symlink())
            .unwrap_or(false);
        // Follow symlinks; a dangling one is described by the link itself
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => entry.metadata().await.map_err(|e| LinkError::io(&path, e))?,
        };
        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos() as i128);

        entries.push(Entry {
            name,
            path,
            kind,
            link,
            modified,
        });
    }

    Ok(entries)
}

pub(super) async fn stat(path: &str) -> Result<FileAttributes> {
    let metadata = fs::metadata(path).await.map_err(|e| LinkError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(FileAttributes {
            mode: metadata.mode(),
            size: metadata.size(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            accessed: metadata.atime(),
            modified: metadata.mtime(),
        })
    }

    #[cfg(not(unix))]
    {
        let secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_secs() as i64)
        };
        let kind = if metadata.is_dir() { 0o040000 } else { 0o100000 };
        let perms = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
        Ok(FileAttributes {
            mode: kind | perms,
            size: metadata.len(),
            uid: 0,
            gid: 0,
            accessed: secs(metadata.accessed()),
            modified: secs(metadata.modified()),
        })
    }
}

pub(super) async fn exists(path: &str) -> Result<bool> {
    fs::try_exists(path).await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn is_dir(path: &str) -> Result<bool> {
    Ok(fs::metadata(path)
        .await
        .map_err(|e| LinkError::io(path, e))?
        .is_dir())
}

pub(super) async fn read(path: &str) -> Result<Vec<u8>> {
    fs::read(path).await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn write(path: &str, content: &[u8]) -> Result<()> {
    fs::write(path, content).await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn remove_file(path: &str) -> Result<()> {
    fs::remove_file(path).await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn remove_dir(path: &str) -> Result<()> {
    fs::remove_dir(path).await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn create_dir_all(path: &str) -> Result<()> {
    fs::create_dir_all(path).await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn rename(from: &str, to: &str) -> Result<()> {
    fs::rename(from, to).await.map_err(|e| LinkError::io(from, e))
}

pub(super) async fn copy(from: &str, to: &str) -> Result<()> {
    fs::copy(from, to).await.map_err(|e| LinkError::io(from, e))?;
    Ok(())
}
