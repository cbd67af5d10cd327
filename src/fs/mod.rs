//! File operations against the active backend
//!
//! Every path argument goes through the [`PathNormalizer`] with the home
//! directory of the backend it targets. A remote backend connects on the
//! first call that needs it.

mod attributes;
mod local;
mod remote;
mod walker;

use std::path::PathBuf;

use tracing::{debug, info, warn};

pub use attributes::{format_time, mode_string, FileAttributes, HumanAttributes, HumanSize};
pub use walker::{CancellationToken, SizeWalk};

use crate::error::{LinkError, Result};
use crate::path::{parent_of, PathNormalizer};
use crate::remote::{Backend, Connected};

/// Restrict a listing to one kind of entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFilter {
    Files,
    Directories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    File,
    Directory,
    Other,
}

/// One directory entry; `kind` follows symlinks, `link` marks them.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
    pub link: bool,
    /// Nanoseconds since the epoch
    pub modified: i128,
}

impl Entry {
    fn matches(&self, filter: Option<EntryFilter>) -> bool {
        match filter {
            None => true,
            Some(EntryFilter::Files) => self.kind == EntryKind::File,
            Some(EntryFilter::Directories) => self.kind == EntryKind::Directory,
        }
    }
}

/// A backend resolved for one operation
enum Store {
    Local,
    Remote(Connected),
}

impl Store {
    async fn list_entries(&self, dir: &str) -> Result<Vec<Entry>> {
        match self {
            Store::Local => local::list_entries(dir).await,
            Store::Remote(c) => remote::list_entries(&c.sftp, dir).await,
        }
    }

    async fn stat(&self, path: &str) -> Result<FileAttributes> {
        match self {
            Store::Local => local::stat(path).await,
            Store::Remote(c) => remote::stat(&c.sftp, path).await,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self {
            Store::Local => local::exists(path).await,
            Store::Remote(c) => remote::exists(&c.sftp, path).await,
        }
    }

    async fn is_dir(&self, path: &str) -> Result<bool> {
        match self {
            Store::Local => local::is_dir(path).await,
            Store::Remote(c) => remote::is_dir(&c.sftp, path).await,
        }
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        match self {
            Store::Local => local::read(path).await,
            Store::Remote(c) => remote::read(&c.sftp, path).await,
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        match self {
            Store::Local => local::write(path, content).await,
            Store::Remote(c) => remote::write(&c.sftp, path, content).await,
        }
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        match self {
            Store::Local => local::remove_file(path).await,
            Store::Remote(c) => remote::remove_file(&c.sftp, path).await,
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        match self {
            Store::Local => local::remove_dir(path).await,
            Store::Remote(c) => remote::remove_dir(&c.sftp, path).await,
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        match self {
            Store::Local => local::rename(from, to).await,
            Store::Remote(c) => remote::rename(&c.sftp, from, to).await,
        }
    }

    /// Create `path` and any missing ancestors.
    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let sftp = match self {
            Store::Local => return local::create_dir_all(path).await,
            Store::Remote(c) => &c.sftp,
        };

        let mut missing = Vec::new();
        let mut cursor = Some(path.trim_end_matches('/').to_string());
        while let Some(dir) = cursor {
            if dir.is_empty() || remote::exists(sftp, &dir).await? {
                break;
            }
            cursor = parent_of(&dir);
            missing.push(dir);
        }
        for dir in missing.iter().rev() {
            debug!("mkdir {}", dir);
            remote::create_dir(sftp, dir).await?;
        }
        Ok(())
    }

    /// Depth-first removal of `dir`; symlinks are unlinked, not followed.
    async fn remove_tree(&self, dir: &str) -> Result<()> {
        for entry in self.list_entries(dir).await? {
            if entry.kind == EntryKind::Directory && !entry.link {
                Box::pin(self.remove_tree(&entry.path)).await?;
            } else {
                self.remove_file(&entry.path).await?;
            }
        }
        self.remove_dir(dir).await
    }
}

/// Unique scratch file on the operator machine, removed on drop.
struct Staging(PathBuf);

impl Staging {
    fn new() -> Self {
        Staging(std::env::temp_dir().join(format!(
            "companion-link-{}.staging",
            uuid::Uuid::new_v4().simple()
        )))
    }

    fn path(&self) -> String {
        self.0.to_string_lossy().into_owned()
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[derive(Debug, Clone)]
pub struct FileOps {
    backend: Backend,
    normalizer: PathNormalizer,
}

impl FileOps {
    pub fn new(backend: Backend, normalizer: PathNormalizer) -> Self {
        Self {
            backend,
            normalizer,
        }
    }

    /// The same operations pinned to the operator machine.
    pub fn local(&self) -> FileOps {
        Self {
            backend: Backend::Local,
            normalizer: self.normalizer.clone(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_remote(&self) -> bool {
        self.backend.is_remote()
    }

    pub fn normalizer(&self) -> &PathNormalizer {
        &self.normalizer
    }

    async fn store(&self) -> Result<(Store, String)> {
        match &self.backend {
            Backend::Local => Ok((Store::Local, local_home())),
            Backend::Remote(session) => {
                let connected = session.establish().await?;
                let home = connected.home_dir.clone();
                Ok((Store::Remote(connected), home))
            }
        }
    }

    async fn resolve(&self, path: &str) -> Result<(Store, String)> {
        let (store, home) = self.store().await?;
        let path = self.normalizer.normalize(path, &home);
        Ok((store, path))
    }

    /// Home directory of the backend, with a trailing `/`.
    pub async fn home_dir(&self) -> Result<String> {
        Ok(self.store().await?.1)
    }

    /// Absolute form of `path` on the backend.
    pub async fn normalize(&self, path: &str) -> Result<String> {
        Ok(self.resolve(path).await?.1)
    }

    /// Entry names of `path`, oldest modification first.
    pub async fn list_contents(&self, path: &str, filter: Option<EntryFilter>) -> Result<Vec<String>> {
        let (store, dir) = self.resolve(path).await?;
        let mut entries: Vec<Entry> = store
            .list_entries(&dir)
            .await?
            .into_iter()
            .filter(|e| e.matches(filter))
            .collect();
        entries.sort_by_key(|e| e.modified);
        Ok(entries.into_iter().map(|e| e.name).collect())
    }

    pub async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        self.list_contents(path, Some(EntryFilter::Files)).await
    }

    pub async fn list_directories(&self, path: &str) -> Result<Vec<String>> {
        self.list_contents(path, Some(EntryFilter::Directories)).await
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let (store, path) = self.resolve(path).await?;
        store.exists(&path).await
    }

    pub async fn read_file(&self, path: &str) -> Result<String> {
        let (store, path) = self.resolve(path).await?;
        let bytes = store.read(&path).await?;
        String::from_utf8(bytes).map_err(|e| {
            LinkError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    pub async fn read_file_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let (store, path) = self.resolve(path).await?;
        store.read(&path).await
    }

    /// Create or overwrite a file, creating its parent directories.
    pub async fn write_file(&self, path: &str, content: impl AsRef<[u8]>) -> Result<()> {
        let (store, path) = self.resolve(path).await?;
        if let Some(parent) = parent_of(&path) {
            store.mkdir_all(&parent).await?;
        }
        store.write(&path, content.as_ref()).await
    }

    pub async fn delete_file(&self, path: &str) -> Result<()> {
        let (store, path) = self.resolve(path).await?;
        store.remove_file(&path).await
    }

    /// Remove a directory. Without `force` a non-empty directory is left
    /// untouched and [`LinkError::NotEmpty`] is returned.
    pub async fn delete_directory(&self, path: &str, force: bool) -> Result<()> {
        let (store, dir) = self.resolve(path).await?;
        let has_entries = !store.list_entries(&dir).await?.is_empty();
        if has_entries && !force {
            return Err(LinkError::NotEmpty(dir));
        }
        info!("Deleting directory {}", dir);
        store.remove_tree(&dir).await
    }

    /// Create a directory and any missing parents.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let (store, path) = self.resolve(path).await?;
        store.mkdir_all(&path).await
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let (store, home) = self.store().await?;
        let old = self.normalizer.normalize(old, &home);
        let new = self.normalizer.normalize(new, &home);
        store.rename(&old, &new).await
    }

    /// Copy (or move, without `keep_original`) within the backend.
    ///
    /// A remote copy round-trips through a staging file on the operator
    /// machine; a remote move is a server-side rename. Both paths naming
    /// the same file is [`LinkError::SameFile`] and nothing is touched.
    pub async fn copy_file(&self, src: &str, dst: &str, keep_original: bool) -> Result<()> {
        let (store, home) = self.store().await?;
        let src = self.normalizer.normalize(src, &home);
        let dst = self.normalizer.normalize(dst, &home);
        // Copying or moving onto itself would truncate or unlink the source
        if src == dst {
            return Err(LinkError::SameFile(src));
        }
        if let Some(parent) = parent_of(&dst) {
            store.mkdir_all(&parent).await?;
        }

        match (&store, keep_original) {
            (Store::Local, true) => local::copy(&src, &dst).await,
            (Store::Remote(c), true) => {
                let staging = Staging::new();
                remote::download(&c.sftp, &src, &staging.path()).await?;
                remote::upload(&c.sftp, &staging.path(), &dst).await?;
                Ok(())
            }
            (Store::Local, false) => {
                if let Err(e) = local::rename(&src, &dst).await {
                    debug!("rename {} -> {} failed ({}), copying instead", src, dst, e);
                    local::copy(&src, &dst).await?;
                    local::remove_file(&src).await?;
                }
                Ok(())
            }
            (Store::Remote(_), false) => {
                if store.exists(&dst).await? {
                    store.remove_file(&dst).await?;
                }
                store.rename(&src, &dst).await
            }
        }
    }

    /// Push a local file to the backend, replacing the destination.
    ///
    /// On a local backend this is a plain copy.
    pub async fn send_file(&self, local_src: &str, dst: &str, keep_original: bool) -> Result<()> {
        let src = self.normalizer.normalize(local_src, &local_home());
        let connected = match &self.backend {
            Backend::Local => return self.copy_file(&src, dst, keep_original).await,
            Backend::Remote(session) => session.establish().await?,
        };

        let dst = self.normalizer.normalize(dst, &connected.home_dir);
        let store = Store::Remote(connected.clone());
        if let Some(parent) = parent_of(&dst) {
            store.mkdir_all(&parent).await?;
        }
        if store.exists(&dst).await? {
            store.remove_file(&dst).await?;
        }

        remote::upload(&connected.sftp, &src, &dst).await?;
        info!("Sent {} to {}", src, dst);

        if !keep_original {
            local::remove_file(&src).await?;
        }
        Ok(())
    }

    /// Pull a file from the companion computer, replacing the local
    /// destination.
    pub async fn get_file(&self, src: &str, local_dst: &str, keep_original: bool) -> Result<()> {
        let session = self.backend.session().ok_or(LinkError::NoRemoteEndpoint)?;
        let connected = session.establish().await?;

        let src = self.normalizer.normalize(src, &connected.home_dir);
        let dst = self.normalizer.normalize(local_dst, &local_home());
        if let Some(parent) = parent_of(&dst) {
            local::create_dir_all(&parent).await?;
        }
        if local::exists(&dst).await? {
            local::remove_file(&dst).await?;
        }

        remote::download(&connected.sftp, &src, &dst).await?;
        info!("Fetched {} to {}", src, dst);

        if !keep_original {
            if let Err(e) = remote::remove_file(&connected.sftp, &src).await {
                warn!("Fetched {} but could not remove it: {}", src, e);
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        let (store, path) = self.resolve(path).await?;
        store.stat(&path).await
    }

    /// [`get_attributes`](Self::get_attributes) rendered for display: mode
    /// string, [`HumanSize`] and local ctime-style timestamps.
    pub async fn get_attributes_human(&self, path: &str) -> Result<HumanAttributes> {
        Ok(self.get_attributes(path).await?.human_readable())
    }

    pub async fn get_file_size(&self, path: &str) -> Result<u64> {
        Ok(self.get_attributes(path).await?.size)
    }

    pub async fn is_dir(&self, path: &str) -> Result<bool> {
        let (store, path) = self.resolve(path).await?;
        store.is_dir(&path).await
    }
}

fn local_home() -> String {
    let home = dirs::home_dir()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string());
    if home.ends_with('/') {
        home
    } else {
        format!("{}/", home)
    }
}
