//! Recursive directory size with cooperative cancellation
//!
//! A walk checks its [`CancellationToken`] before visiting each entry. The
//! token is cheap to clone, so the walk can run on a spawned task while
//! another task holds a clone to cancel it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::{EntryKind, FileOps, HumanSize, Store};
use crate::error::{LinkError, Result};

const IDLE: u8 = 0;
const ACTIVE: u8 = 1;
const CANCELLED: u8 = 2;

/// Three-state flag: idle, walk active, cancellation requested.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicU8>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running walk to stop. Returns `false` when no walk is active.
    pub fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(ACTIVE, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(CANCELLED) => true,
            Err(_) => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) != IDLE
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Mark a walk as running, clearing any earlier cancel; idle again when
    /// the guard drops.
    fn begin(&self) -> ActiveWalk<'_> {
        self.arm();
        ActiveWalk { token: self }
    }

    fn arm(&self) {
        self.state.store(ACTIVE, Ordering::Release);
    }

    fn disarm(&self) {
        self.state.store(IDLE, Ordering::Release);
    }

    fn check(&self, path: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(LinkError::Cancelled(path.to_string()));
        }
        Ok(())
    }
}

struct ActiveWalk<'a> {
    token: &'a CancellationToken,
}

impl Drop for ActiveWalk<'_> {
    fn drop(&mut self) {
        self.token.disarm();
    }
}

/// A size walk bound to its own token, ready to be spawned.
///
/// The token is active from creation, so a cancel issued before the walk
/// is first polled still stops it. Dropping the walk leaves the token idle.
pub struct SizeWalk {
    files: FileOps,
    path: String,
    token: CancellationToken,
}

impl SizeWalk {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn run(self) -> Result<u64> {
        self.files.measure(&self.path, &self.token).await
    }
}

impl Drop for SizeWalk {
    fn drop(&mut self) {
        self.token.disarm();
    }
}

impl FileOps {
    /// Prepare a walk of `path` with a fresh, already active token.
    pub fn size_walk(&self, path: &str) -> SizeWalk {
        let token = CancellationToken::new();
        token.arm();
        SizeWalk {
            files: self.clone(),
            path: path.to_string(),
            token,
        }
    }

    /// Total size in bytes of the regular files under `path`.
    ///
    /// Any earlier cancellation left on `token` is cleared first. Once
    /// [`CancellationToken::cancel`] is observed the walk stops with
    /// [`LinkError::Cancelled`] and the token returns to idle.
    pub async fn get_directory_content_size(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> Result<u64> {
        let _active = token.begin();
        self.measure(path, token).await
    }

    /// [`get_directory_content_size`](Self::get_directory_content_size)
    /// rendered with [`HumanSize`], e.g. `"2.05 KB"`.
    pub async fn get_directory_content_size_human(
        &self,
        path: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        let bytes = self.get_directory_content_size(path, token).await?;
        Ok(HumanSize(bytes).to_string())
    }

    /// Walk with `token` already active; a cancel seen at any step,
    /// including before the first listing, aborts the walk.
    async fn measure(&self, path: &str, token: &CancellationToken) -> Result<u64> {
        token.check(path)?;
        let (store, dir) = self.resolve(path).await?;
        debug!("Measuring {}", dir);

        let total = walk(&store, &dir, token).await;
        match &total {
            Ok(bytes) => debug!("{} holds {} bytes", dir, bytes),
            Err(LinkError::Cancelled(at)) => info!("Size walk of {} cancelled at {}", dir, at),
            Err(_) => {}
        }
        total
    }
}

async fn walk(store: &Store, dir: &str, token: &CancellationToken) -> Result<u64> {
    let entries = store.list_entries(dir).await?;
    let mut total = 0u64;

    for entry in entries.iter().filter(|e| e.kind == EntryKind::File) {
        token.check(&entry.path)?;
        total += store.stat(&entry.path).await?.size;
    }

    for entry in entries
        .iter()
        .filter(|e| e.kind == EntryKind::Directory && !e.link)
    {
        token.check(&entry.path)?;
        total += Box::pin(walk(store, &entry.path, token)).await?;
    }

    Ok(total)
}
