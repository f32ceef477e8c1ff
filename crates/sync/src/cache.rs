//! Local child cache.
//!
//! [`MemoryCache`] keeps everything in process; [`FileCache`] also writes
//! a JSON snapshot after every change so the cache survives restarts.
//! Children created while offline get negative ids (`-1`, `-2`, ...) that
//! can never collide with server-assigned ones. The offline write queue is
//! kept in the same snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use covenant_core::models::Participant;
use covenant_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::outbox::PendingWrite;

/// Errors from a [`LocalCache`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, id: DbId) -> Result<Option<Participant>, CacheError>;

    async fn list_for_guardian(&self, guardian_id: &str) -> Result<Vec<Participant>, CacheError>;

    /// Case-insensitive substring match on first or last name.
    async fn search(&self, query: &str) -> Result<Vec<Participant>, CacheError>;

    async fn put(&self, child: Participant) -> Result<(), CacheError>;

    async fn put_all(&self, children: Vec<Participant>) -> Result<(), CacheError>;

    async fn remove(&self, id: DbId) -> Result<Option<Participant>, CacheError>;

    /// Allocate the next negative id for a child created offline.
    async fn next_local_id(&self) -> Result<DbId, CacheError>;

    /// Writes queued while offline, oldest first.
    async fn load_pending(&self) -> Result<Vec<PendingWrite>, CacheError>;

    /// Replace the stored write queue.
    async fn save_pending(&self, writes: &[PendingWrite]) -> Result<(), CacheError>;
}

/// Serialized cache contents.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CacheState {
    children: BTreeMap<DbId, Participant>,
    /// Count of local ids handed out so far.
    local_ids_issued: i64,
    #[serde(default)]
    pending: Vec<PendingWrite>,
}

impl CacheState {
    fn list_for_guardian(&self, guardian_id: &str) -> Vec<Participant> {
        self.children
            .values()
            .filter(|c| c.guardian_id == guardian_id)
            .cloned()
            .collect()
    }

    fn search(&self, query: &str) -> Vec<Participant> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.children
            .values()
            .filter(|c| {
                c.first_name.to_lowercase().contains(&needle)
                    || c.last_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    fn next_local_id(&mut self) -> DbId {
        self.local_ids_issued += 1;
        -self.local_ids_issued
    }
}

#[derive(Default)]
pub struct MemoryCache {
    state: RwLock<CacheState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, id: DbId) -> Result<Option<Participant>, CacheError> {
        Ok(self.state.read().await.children.get(&id).cloned())
    }

    async fn list_for_guardian(&self, guardian_id: &str) -> Result<Vec<Participant>, CacheError> {
        Ok(self.state.read().await.list_for_guardian(guardian_id))
    }

    async fn search(&self, query: &str) -> Result<Vec<Participant>, CacheError> {
        Ok(self.state.read().await.search(query))
    }

    async fn put(&self, child: Participant) -> Result<(), CacheError> {
        self.state.write().await.children.insert(child.id, child);
        Ok(())
    }

    async fn put_all(&self, children: Vec<Participant>) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        for child in children {
            state.children.insert(child.id, child);
        }
        Ok(())
    }

    async fn remove(&self, id: DbId) -> Result<Option<Participant>, CacheError> {
        Ok(self.state.write().await.children.remove(&id))
    }

    async fn next_local_id(&self) -> Result<DbId, CacheError> {
        Ok(self.state.write().await.next_local_id())
    }

    async fn load_pending(&self) -> Result<Vec<PendingWrite>, CacheError> {
        Ok(self.state.read().await.pending.clone())
    }

    async fn save_pending(&self, writes: &[PendingWrite]) -> Result<(), CacheError> {
        self.state.write().await.pending = writes.to_vec();
        Ok(())
    }
}

/// A cache persisted as a JSON file.
pub struct FileCache {
    path: PathBuf,
    state: RwLock<CacheState>,
}

impl FileCache {
    /// Open the cache at `path`, loading an existing snapshot if present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheState::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot to a sibling temp file, then rename over the
    /// original so a crash never leaves a half-written cache.
    async fn persist(&self, state: &CacheState) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn get(&self, id: DbId) -> Result<Option<Participant>, CacheError> {
        Ok(self.state.read().await.children.get(&id).cloned())
    }

    async fn list_for_guardian(&self, guardian_id: &str) -> Result<Vec<Participant>, CacheError> {
        Ok(self.state.read().await.list_for_guardian(guardian_id))
    }

    async fn search(&self, query: &str) -> Result<Vec<Participant>, CacheError> {
        Ok(self.state.read().await.search(query))
    }

    async fn put(&self, child: Participant) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.children.insert(child.id, child);
        self.persist(&state).await
    }

    async fn put_all(&self, children: Vec<Participant>) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        for child in children {
            state.children.insert(child.id, child);
        }
        self.persist(&state).await
    }

    async fn remove(&self, id: DbId) -> Result<Option<Participant>, CacheError> {
        let mut state = self.state.write().await;
        let removed = state.children.remove(&id);
        if removed.is_some() {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    async fn next_local_id(&self) -> Result<DbId, CacheError> {
        let mut state = self.state.write().await;
        let id = state.next_local_id();
        self.persist(&state).await?;
        Ok(id)
    }

    async fn load_pending(&self) -> Result<Vec<PendingWrite>, CacheError> {
        Ok(self.state.read().await.pending.clone())
    }

    async fn save_pending(&self, writes: &[PendingWrite]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.pending = writes.to_vec();
        self.persist(&state).await
    }
}
