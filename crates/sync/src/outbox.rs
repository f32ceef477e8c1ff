//! Queue of writes accepted locally while the remote was unreachable.
//!
//! The queue is stored through the [`LocalCache`] next to the children it
//! refers to, so a [`FileCache`](crate::cache::FileCache) keeps both across
//! restarts. It is loaded on first use and written back after every change.

use std::sync::Arc;

use covenant_core::models::{NewParticipant, Participant};
use covenant_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::{CacheError, LocalCache};

/// A write accepted locally while the remote was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingWrite {
    Register { local_id: DbId, input: NewParticipant },
    Update { child: Participant },
    Delete { child_id: DbId },
    CheckIn { child_id: DbId, resource_id: DbId },
    CheckOut { child_id: DbId },
}

impl PendingWrite {
    pub fn child_id(&self) -> DbId {
        match self {
            Self::Register { local_id, .. } => *local_id,
            Self::Update { child } => child.id,
            Self::Delete { child_id }
            | Self::CheckIn { child_id, .. }
            | Self::CheckOut { child_id } => *child_id,
        }
    }

    /// Point a write at the server id a local child was registered under.
    fn remap(&mut self, from: DbId, to: DbId) {
        match self {
            Self::Update { child } if child.id == from => child.id = to,
            Self::Delete { child_id }
            | Self::CheckIn { child_id, .. }
            | Self::CheckOut { child_id }
                if *child_id == from =>
            {
                *child_id = to
            }
            _ => {}
        }
    }
}

pub(crate) struct Outbox {
    cache: Arc<dyn LocalCache>,
    /// `None` until loaded from the cache.
    queue: Mutex<Option<Vec<PendingWrite>>>,
}

impl Outbox {
    pub(crate) fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self {
            cache,
            queue: Mutex::new(None),
        }
    }

    /// Run `f` on the queue; when it reports a change, store the result.
    async fn with_queue<R>(
        &self,
        f: impl FnOnce(&mut Vec<PendingWrite>) -> (R, bool),
    ) -> Result<R, CacheError> {
        let mut guard = self.queue.lock().await;
        if guard.is_none() {
            *guard = Some(self.cache.load_pending().await?);
        }
        let queue = guard.get_or_insert_with(Vec::new);
        let (result, changed) = f(queue);
        if changed {
            self.cache.save_pending(&queue[..]).await?;
        }
        Ok(result)
    }

    pub(crate) async fn snapshot(&self) -> Result<Vec<PendingWrite>, CacheError> {
        self.with_queue(|q| (q.clone(), false)).await
    }

    /// Append and return the new queue length.
    pub(crate) async fn push(&self, write: PendingWrite) -> Result<usize, CacheError> {
        self.with_queue(|q| {
            q.push(write);
            (q.len(), true)
        })
        .await
    }

    pub(crate) async fn front(&self) -> Result<Option<PendingWrite>, CacheError> {
        self.with_queue(|q| (q.first().cloned(), false)).await
    }

    /// Drop the first entry equal to `write`, if it is still queued.
    pub(crate) async fn remove(&self, write: &PendingWrite) -> Result<(), CacheError> {
        self.with_queue(|q| match q.iter().position(|w| w == write) {
            Some(pos) => {
                q.remove(pos);
                ((), true)
            }
            None => ((), false),
        })
        .await
    }

    pub(crate) async fn remap(&self, from: DbId, to: DbId) -> Result<(), CacheError> {
        self.with_queue(|q| {
            let changed = q.iter().any(|w| w.child_id() == from);
            q.iter_mut().for_each(|w| w.remap(from, to));
            ((), changed)
        })
        .await
    }

    /// Forget every write queued for `child_id`.
    pub(crate) async fn discard_for(&self, child_id: DbId) -> Result<(), CacheError> {
        self.with_queue(|q| {
            let before = q.len();
            q.retain(|w| w.child_id() != child_id);
            ((), q.len() != before)
        })
        .await
    }

    pub(crate) async fn has_pending(&self, child_id: DbId) -> Result<bool, CacheError> {
        self.with_queue(|q| (q.iter().any(|w| w.child_id() == child_id), false))
            .await
    }
}
