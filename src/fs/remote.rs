//! Filesystem primitives on the companion computer, over SFTP

use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes as SftpAttributes, OpenFlags};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::attributes::FileAttributes;
use super::{Entry, EntryKind};
use crate::error::{LinkError, Result};
use crate::path::join_path;

fn map_sftp_error(err: SftpErrorInner, path: &str) -> LinkError {
    let message = err.to_string();
    if message.contains("No such file") || message.contains("not found") {
        LinkError::NotFound(path.to_string())
    } else {
        LinkError::Sftp {
            path: path.to_string(),
            message,
        }
    }
}

fn to_attributes(attrs: &SftpAttributes) -> FileAttributes {
    FileAttributes {
        mode: attrs.permissions.unwrap_or(0),
        size: attrs.size.unwrap_or(0),
        uid: attrs.uid.unwrap_or(0),
        gid: attrs.gid.unwrap_or(0),
        accessed: attrs.atime.map_or(0, i64::from),
        modified: attrs.mtime.map_or(0, i64::from),
    }
}

fn kind_of(attrs: &SftpAttributes) -> EntryKind {
    if attrs.is_dir() {
        EntryKind::Directory
    } else if attrs.is_regular() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

pub(super) async fn list_entries(sftp: &SftpSession, dir: &str) -> Result<Vec<Entry>> {
    let read_dir = sftp
        .read_dir(dir)
        .await
        .map_err(|e| map_sftp_error(e, dir))?;

    let mut entries = Vec::new();
    for entry in read_dir {
        let name = entry.file_name();
        if name == "." || name == ".." {
            continue;
        }
        let path = join_path(dir, &name);
        let mut attrs = entry.metadata();
        let link = attrs.is_symlink();
        // readdir reports the link itself; classify by its target
        if link {
            if let Ok(target) = sftp.metadata(&path).await {
                attrs = target;
            }
        }
        entries.push(Entry {
            kind: kind_of(&attrs),
            link,
            modified: i128::from(attrs.mtime.unwrap_or(0)) * 1_000_000_000,
            name,
            path,
        });
    }

    Ok(entries)
}

pub(super) async fn stat(sftp: &SftpSession, path: &str) -> Result<FileAttributes> {
    let attrs = sftp
        .metadata(path)
        .await
        .map_err(|e| map_sftp_error(e, path))?;
    Ok(to_attributes(&attrs))
}

pub(super) async fn exists(sftp: &SftpSession, path: &str) -> Result<bool> {
    match sftp.metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) => match map_sftp_error(e, path) {
            LinkError::NotFound(_) => Ok(false),
            other => Err(other),
        },
    }
}

pub(super) async fn is_dir(sftp: &SftpSession, path: &str) -> Result<bool> {
    let attrs = sftp
        .metadata(path)
        .await
        .map_err(|e| map_sftp_error(e, path))?;
    Ok(attrs.is_dir())
}

pub(super) async fn read(sftp: &SftpSession, path: &str) -> Result<Vec<u8>> {
    sftp.read(path).await.map_err(|e| map_sftp_error(e, path))
}

pub(super) async fn write(sftp: &SftpSession, path: &str, content: &[u8]) -> Result<()> {
    let mut file = sftp
        .open_with_flags(path, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
        .await
        .map_err(|e| map_sftp_error(e, path))?;
    file.write_all(content)
        .await
        .map_err(|e| LinkError::io(path, e))?;
    file.shutdown().await.map_err(|e| LinkError::io(path, e))
}

pub(super) async fn remove_file(sftp: &SftpSession, path: &str) -> Result<()> {
    sftp.remove_file(path)
        .await
        .map_err(|e| map_sftp_error(e, path))
}

pub(super) async fn remove_dir(sftp: &SftpSession, path: &str) -> Result<()> {
    sftp.remove_dir(path)
        .await
        .map_err(|e| map_sftp_error(e, path))
}

pub(super) async fn create_dir(sftp: &SftpSession, path: &str) -> Result<()> {
    sftp.create_dir(path)
        .await
        .map_err(|e| map_sftp_error(e, path))
}

pub(super) async fn rename(sftp: &SftpSession, from: &str, to: &str) -> Result<()> {
    sftp.rename(from, to)
        .await
        .map_err(|e| map_sftp_error(e, from))
}

/// Stream a remote file into a local path.
pub(super) async fn download(sftp: &SftpSession, remote: &str, local: &str) -> Result<u64> {
    let mut source = sftp.open(remote).await.map_err(|e| map_sftp_error(e, remote))?;
    let mut target = tokio::fs::File::create(local)
        .await
        .map_err(|e| LinkError::io(local, e))?;
    let copied = tokio::io::copy(&mut source, &mut target)
        .await
        .map_err(|e| LinkError::io(remote, e))?;
    target.flush().await.map_err(|e| LinkError::io(local, e))?;
    debug!("Downloaded {} -> {} ({} bytes)", remote, local, copied);
    Ok(copied)
}

/// Stream a local file to a remote path, replacing it.
pub(super) async fn upload(sftp: &SftpSession, local: &str, remote: &str) -> Result<u64> {
    let mut source = tokio::fs::File::open(local)
        .await
        .map_err(|e| LinkError::io(local, e))?;
    let mut target = sftp
        .open_with_flags(remote, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
        .await
        .map_err(|e| map_sftp_error(e, remote))?;
    let copied = tokio::io::copy(&mut source, &mut target)
        .await
        .map_err(|e| LinkError::io(remote, e))?;
    target.shutdown().await.map_err(|e| LinkError::io(remote, e))?;
    debug!("Uploaded {} -> {} ({} bytes)", local, remote, copied);
    Ok(copied)
}
