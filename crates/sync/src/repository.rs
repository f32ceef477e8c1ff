//! The offline-first child repository.
//!
//! Reads are answered from the local cache when it has the data, with a
//! background refresh from the remote; a miss waits for the remote and
//! caches what it returns. Writes are applied locally first and then sent
//! to the remote:
//!
//! - remote unreachable: the local write stands, the call reports
//!   `Success`, and the write is queued for [`OfflineFirstRepository::flush_pending`];
//! - remote refuses: the local write is undone and the call reports `Error`;
//! - remote accepts: its canonical value (server id, timestamps) replaces
//!   the local one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use covenant_core::clock::Clock;
use covenant_core::error::CoreError;
use covenant_core::models::{NewParticipant, Participant};
use covenant_core::status::ParticipantStatus;
use covenant_core::types::DbId;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use validator::Validate;

use crate::cache::{CacheError, FileCache, LocalCache, MemoryCache};
use crate::config::SyncConfig;
use crate::http::HttpRemoteService;
use crate::outbox::{Outbox, PendingWrite};
use crate::policy::{plan_read, remote_read_result, resolve_write, ReadPlan, WriteResolution};
use crate::remote::{RemoteError, RemoteService};
use crate::result::RepoResult;

/// Errors building a repository from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

pub struct OfflineFirstRepository {
    remote: Arc<dyn RemoteService>,
    cache: Arc<dyn LocalCache>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    refreshes: TaskTracker,
    outbox: Arc<Outbox>,
    /// Held for the whole of a flush so two flushes never deliver the same
    /// write twice.
    flushing: Mutex<()>,
}

/// Ids below zero were assigned on this device and are unknown remotely.
fn is_local_id(id: DbId) -> bool {
    id < 0
}

/// Bound a remote call; running out of time counts as a network error.
async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
        Err(RemoteError::Network(format!(
            "remote call timed out after {}ms",
            timeout.as_millis()
        )))
    })
}

fn cache_failure<T>(err: CacheError) -> RepoResult<T> {
    tracing::error!(error = %err, "Local cache failure");
    RepoResult::Error(format!("local cache unavailable: {err}"))
}

impl OfflineFirstRepository {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        cache: Arc<dyn LocalCache>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            cache: Arc::clone(&cache),
            clock,
            timeout,
            refreshes: TaskTracker::new(),
            outbox: Arc::new(Outbox::new(Arc::clone(&cache))),
            flushing: Mutex::new(()),
        }
    }

    /// Build the HTTP remote and the configured cache.
    pub async fn from_config(config: &SyncConfig, clock: Arc<dyn Clock>) -> Result<Self, SetupError> {
        let remote = HttpRemoteService::new(config.remote_base_url.clone(), config.remote_timeout)?;
        let cache: Arc<dyn LocalCache> = match &config.cache_path {
            Some(path) => Arc::new(FileCache::open(path).await?),
            None => Arc::new(MemoryCache::new()),
        };
        tracing::info!(
            remote = %config.remote_base_url,
            cache = ?config.cache_path,
            "Offline-first repository ready"
        );
        Ok(Self::new(Arc::new(remote), cache, clock, config.remote_timeout))
    }

    // -- Reads ---------------------------------------------------------------

    pub async fn get_child(&self, id: DbId) -> RepoResult<Participant> {
        self.try_get_child(id).await.unwrap_or_else(cache_failure)
    }

    async fn try_get_child(&self, id: DbId) -> Result<RepoResult<Participant>, CacheError> {
        let local = self.cache.get(id).await?;
        match (plan_read(local.is_some(), is_local_id(id)), local) {
            (ReadPlan::ServeLocal { refresh }, Some(child)) => {
                if refresh {
                    self.refresh_child(id);
                }
                Ok(RepoResult::Success(child))
            }
            _ if is_local_id(id) => Ok(RepoResult::Error(format!("child {id} not found"))),
            _ => match self.call(self.remote.get_child(id)).await {
                Ok(Some(child)) => {
                    self.cache.put(child.clone()).await?;
                    Ok(RepoResult::Success(child))
                }
                Ok(None) => Ok(RepoResult::Error(format!("child {id} not found"))),
                Err(e) => Ok(remote_read_result(Err(e))),
            },
        }
    }

    pub async fn list_children(&self, guardian_id: &str) -> RepoResult<Vec<Participant>> {
        self.try_list_children(guardian_id)
            .await
            .unwrap_or_else(cache_failure)
    }

    async fn try_list_children(
        &self,
        guardian_id: &str,
    ) -> Result<RepoResult<Vec<Participant>>, CacheError> {
        let local = self.cache.list_for_guardian(guardian_id).await?;
        if let ReadPlan::ServeLocal { refresh } = plan_read(!local.is_empty(), false) {
            if refresh {
                let guardian_id = guardian_id.to_string();
                self.refresh_many("children", move |remote| async move {
                    remote.list_children(&guardian_id).await
                });
            }
            return Ok(RepoResult::Success(local));
        }

        let fetched = remote_read_result(self.call(self.remote.list_children(guardian_id)).await);
        if let RepoResult::Success(children) = &fetched {
            self.cache.put_all(children.clone()).await?;
        }
        Ok(fetched)
    }

    pub async fn search_children(&self, query: &str) -> RepoResult<Vec<Participant>> {
        self.try_search_children(query)
            .await
            .unwrap_or_else(cache_failure)
    }

    async fn try_search_children(
        &self,
        query: &str,
    ) -> Result<RepoResult<Vec<Participant>>, CacheError> {
        let local = self.cache.search(query).await?;
        if let ReadPlan::ServeLocal { refresh } = plan_read(!local.is_empty(), false) {
            if refresh {
                let query = query.to_string();
                self.refresh_many("search", move |remote| async move {
                    remote.search_children(&query).await
                });
            }
            return Ok(RepoResult::Success(local));
        }

        let fetched = remote_read_result(self.call(self.remote.search_children(query)).await);
        if let RepoResult::Success(children) = &fetched {
            self.cache.put_all(children.clone()).await?;
        }
        Ok(fetched)
    }

    /// The cached copy only, without touching the remote.
    pub async fn get_cached_child(&self, id: DbId) -> Option<Participant> {
        match self.cache.get(id).await {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(child_id = id, error = %e, "Cache read failed");
                None
            }
        }
    }

    // -- Writes --------------------------------------------------------------

    /// Register a child. Offline, the child is kept under a negative local
    /// id until [`flush_pending`](Self::flush_pending) reaches the remote.
    pub async fn register_child(&self, input: NewParticipant) -> RepoResult<Participant> {
        if let Err(e) = input.validate() {
            return RepoResult::Error(format!("invalid child: {e}"));
        }
        self.try_register_child(input)
            .await
            .unwrap_or_else(cache_failure)
    }

    async fn try_register_child(
        &self,
        input: NewParticipant,
    ) -> Result<RepoResult<Participant>, CacheError> {
        let local_id = self.cache.next_local_id().await?;
        let local = Participant {
            id: local_id,
            guardian_id: input.guardian_id.clone(),
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            birth_date: input.birth_date,
            status: ParticipantStatus::NotInService,
            current_resource_id: None,
            last_check_in: None,
            last_check_out: None,
        };
        self.cache.put(local.clone()).await?;

        match resolve_write(self.call(self.remote.register_child(&input)).await) {
            WriteResolution::Commit(server) => {
                self.cache.remove(local_id).await?;
                self.cache.put(server.clone()).await?;
                tracing::info!(child_id = server.id, "Child registered");
                Ok(RepoResult::Success(server))
            }
            WriteResolution::KeepLocal(msg) => {
                tracing::info!(local_id, error = %msg, "Remote unreachable, child registered locally");
                self.enqueue(PendingWrite::Register { local_id, input }).await?;
                Ok(RepoResult::Success(local))
            }
            WriteResolution::Rollback(msg) => {
                self.cache.remove(local_id).await?;
                Ok(RepoResult::Error(msg))
            }
        }
    }

    pub async fn update_child(&self, child: Participant) -> RepoResult<Participant> {
        self.try_update_child(child)
            .await
            .unwrap_or_else(cache_failure)
    }

    async fn try_update_child(
        &self,
        child: Participant,
    ) -> Result<RepoResult<Participant>, CacheError> {
        let previous = self.cache.get(child.id).await?;
        let pending = PendingWrite::Update {
            child: child.clone(),
        };
        self.write_through(child.id, previous, Some(child.clone()), pending, async {
            self.remote.update_child(&child).await
        })
        .await
    }

    pub async fn delete_child(&self, id: DbId) -> RepoResult<()> {
        self.try_delete_child(id).await.unwrap_or_else(cache_failure)
    }

    async fn try_delete_child(&self, id: DbId) -> Result<RepoResult<()>, CacheError> {
        let previous = self.cache.remove(id).await?;
        if is_local_id(id) {
            // Never reached the remote: forgetting its queued writes is enough.
            self.outbox.discard_for(id).await?;
            return Ok(RepoResult::Success(()));
        }

        match resolve_write(self.call(self.remote.delete_child(id)).await) {
            WriteResolution::Commit(()) => {
                tracing::info!(child_id = id, "Child deleted");
                Ok(RepoResult::Success(()))
            }
            WriteResolution::KeepLocal(_) => {
                self.enqueue(PendingWrite::Delete { child_id: id }).await?;
                Ok(RepoResult::Success(()))
            }
            WriteResolution::Rollback(msg) => {
                if let Some(previous) = previous {
                    self.cache.put(previous).await?;
                }
                Ok(RepoResult::Error(msg))
            }
        }
    }

    pub async fn check_in(&self, child_id: DbId, resource_id: DbId) -> RepoResult<Participant> {
        self.try_check_in(child_id, resource_id)
            .await
            .unwrap_or_else(cache_failure)
    }

    async fn try_check_in(
        &self,
        child_id: DbId,
        resource_id: DbId,
    ) -> Result<RepoResult<Participant>, CacheError> {
        let previous = self.cache.get(child_id).await?;
        if previous.as_ref().is_some_and(Participant::is_checked_in) {
            return Ok(RepoResult::Error(CoreError::AlreadyCheckedIn.to_string()));
        }
        let now = self.clock.now();
        let optimistic = previous.clone().map(|mut child| {
            child.status = ParticipantStatus::CheckedIn;
            child.current_resource_id = Some(resource_id);
            child.last_check_in = Some(now);
            child
        });
        let pending = PendingWrite::CheckIn {
            child_id,
            resource_id,
        };
        self.write_through(child_id, previous, optimistic, pending, async {
            self.remote.check_in(child_id, resource_id).await
        })
        .await
    }

    pub async fn check_out(&self, child_id: DbId) -> RepoResult<Participant> {
        self.try_check_out(child_id)
            .await
            .unwrap_or_else(cache_failure)
    }

    async fn try_check_out(&self, child_id: DbId) -> Result<RepoResult<Participant>, CacheError> {
        let previous = self.cache.get(child_id).await?;
        if previous.as_ref().is_some_and(|c| !c.is_checked_in()) {
            return Ok(RepoResult::Error(CoreError::NotCheckedIn.to_string()));
        }
        let now = self.clock.now();
        let optimistic = previous.clone().map(|mut child| {
            child.status = ParticipantStatus::CheckedOut;
            child.current_resource_id = None;
            child.last_check_out = Some(now);
            child
        });
        let pending = PendingWrite::CheckOut { child_id };
        self.write_through(child_id, previous, optimistic, pending, async {
            self.remote.check_out(child_id).await
        })
        .await
    }

    /// Shared tail of the single-child writes: apply `optimistic` locally,
    /// call the remote, then commit, keep, or roll back.
    async fn write_through(
        &self,
        child_id: DbId,
        previous: Option<Participant>,
        optimistic: Option<Participant>,
        pending: PendingWrite,
        remote: impl Future<Output = Result<Participant, RemoteError>>,
    ) -> Result<RepoResult<Participant>, CacheError> {
        if let Some(child) = &optimistic {
            self.cache.put(child.clone()).await?;
        }

        if is_local_id(child_id) {
            return Ok(match optimistic {
                Some(child) => {
                    self.enqueue(pending).await?;
                    RepoResult::Success(child)
                }
                None => RepoResult::Error(format!("child {child_id} not found")),
            });
        }

        match resolve_write(self.call(remote).await) {
            WriteResolution::Commit(server) => {
                self.cache.put(server.clone()).await?;
                Ok(RepoResult::Success(server))
            }
            WriteResolution::KeepLocal(msg) => match optimistic {
                Some(child) => {
                    tracing::info!(child_id, error = %msg, "Remote unreachable, keeping local write");
                    self.enqueue(pending).await?;
                    Ok(RepoResult::Success(child))
                }
                // Nothing cached to write against; the caller must retry.
                None => Ok(RepoResult::NetworkError(msg)),
            },
            WriteResolution::Rollback(msg) => {
                if optimistic.is_some() {
                    match previous {
                        Some(previous) => self.cache.put(previous).await?,
                        None => {
                            self.cache.remove(child_id).await?;
                        }
                    }
                }
                Ok(RepoResult::Error(msg))
            }
        }
    }

    // -- Outbox --------------------------------------------------------------

    /// Writes accepted offline and not yet delivered, oldest first. The queue
    /// is kept in the local cache and survives a restart with a file cache.
    pub async fn pending_writes(&self) -> Result<Vec<PendingWrite>, CacheError> {
        self.outbox.snapshot().await
    }

    /// Replay queued writes in order. Stops at the first network failure and
    /// leaves that write and everything after it queued; writes the remote
    /// refuses are dropped. Returns how many writes were delivered.
    ///
    /// A write leaves the queue only once the remote has answered for it.
    pub async fn flush_pending(&self) -> RepoResult<usize> {
        let _flushing = self.flushing.lock().await;
        let mut delivered = 0;
        loop {
            let write = match self.outbox.front().await {
                Ok(Some(write)) => write,
                Ok(None) => break,
                Err(e) => return cache_failure(e),
            };

            match self.replay(&write).await {
                Ok(()) => delivered += 1,
                Err(RemoteError::Network(msg)) => {
                    tracing::info!(delivered, error = %msg, "Remote still unreachable, flush paused");
                    return RepoResult::NetworkError(msg);
                }
                Err(e) => {
                    tracing::warn!(?write, error = %e, "Remote refused queued write, dropping it");
                    if let PendingWrite::Register { local_id, .. } = write {
                        self.discard_local(local_id).await;
                    }
                }
            }
            if let Err(e) = self.outbox.remove(&write).await {
                return cache_failure(e);
            }
        }
        if delivered > 0 {
            tracing::info!(delivered, "Flushed offline writes");
        }
        RepoResult::Success(delivered)
    }

    async fn replay(&self, write: &PendingWrite) -> Result<(), RemoteError> {
        match write {
            PendingWrite::Register { local_id, input } => {
                let server = self.call(self.remote.register_child(input)).await?;
                if let Err(e) = self.outbox.remap(*local_id, server.id).await {
                    tracing::error!(local_id, server_id = server.id, error = %e, "Failed to store remapped offline writes");
                }
                self.settle(Some(*local_id), server).await;
            }
            PendingWrite::Update { child } => {
                let server = self.call(self.remote.update_child(child)).await?;
                self.settle(None, server).await;
            }
            PendingWrite::Delete { child_id } => {
                self.call(self.remote.delete_child(*child_id)).await?;
            }
            PendingWrite::CheckIn {
                child_id,
                resource_id,
            } => {
                let server = self.call(self.remote.check_in(*child_id, *resource_id)).await?;
                self.settle(None, server).await;
            }
            PendingWrite::CheckOut { child_id } => {
                let server = self.call(self.remote.check_out(*child_id)).await?;
                self.settle(None, server).await;
            }
        }
        Ok(())
    }

    /// Store a canonical child delivered during a flush, dropping the local
    /// entry it replaces.
    async fn settle(&self, replaces: Option<DbId>, server: Participant) {
        let result = async {
            if let Some(local_id) = replaces {
                self.cache.remove(local_id).await?;
            }
            self.cache.put(server).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to cache flushed child");
        }
    }

    async fn discard_local(&self, local_id: DbId) {
        if let Err(e) = self.outbox.discard_for(local_id).await {
            tracing::warn!(local_id, error = %e, "Failed to drop queued writes of refused local child");
        }
        if let Err(e) = self.cache.remove(local_id).await {
            tracing::warn!(local_id, error = %e, "Failed to drop refused local child");
        }
    }

    async fn enqueue(&self, write: PendingWrite) -> Result<(), CacheError> {
        let queued = self.outbox.push(write).await?;
        tracing::debug!(queued, "Offline write queued");
        Ok(())
    }

    // -- Background refresh --------------------------------------------------

    /// Wait for every background refresh started so far.
    pub async fn wait_for_refreshes(&self) {
        self.refreshes.close();
        self.refreshes.wait().await;
        self.refreshes.reopen();
    }

    async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        with_timeout(self.timeout, call).await
    }

    fn refresh_child(&self, id: DbId) {
        let remote = Arc::clone(&self.remote);
        let cache = Arc::clone(&self.cache);
        let outbox = Arc::clone(&self.outbox);
        let timeout = self.timeout;
        self.refreshes.spawn(async move {
            let fetched = match with_timeout(timeout, remote.get_child(id)).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!(child_id = id, error = %e, "Background refresh failed");
                    return;
                }
            };
            if has_pending(&outbox, id).await {
                return;
            }
            let stored = match fetched {
                Some(child) => cache.put(child).await,
                None => cache.remove(id).await.map(|_| ()),
            };
            if let Err(e) = stored {
                tracing::warn!(child_id = id, error = %e, "Background refresh could not update cache");
            }
        });
    }

    fn refresh_many<F, Fut>(&self, what: &'static str, fetch: F)
    where
        F: FnOnce(Arc<dyn RemoteService>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<Participant>, RemoteError>> + Send + 'static,
    {
        let remote = Arc::clone(&self.remote);
        let cache = Arc::clone(&self.cache);
        let outbox = Arc::clone(&self.outbox);
        let timeout = self.timeout;
        self.refreshes.spawn(async move {
            let children = match with_timeout(timeout, fetch(remote)).await {
                Ok(children) => children,
                Err(e) => {
                    tracing::warn!(what, error = %e, "Background refresh failed");
                    return;
                }
            };
            let mut fresh = Vec::with_capacity(children.len());
            for child in children {
                if !has_pending(&outbox, child.id).await {
                    fresh.push(child);
                }
            }
            if let Err(e) = cache.put_all(fresh).await {
                tracing::warn!(what, error = %e, "Background refresh could not update cache");
            }
        });
    }
}

/// Local state with undelivered writes must not be overwritten by a refresh.
/// When the queue cannot be read, assume there is some.
async fn has_pending(outbox: &Outbox, child_id: DbId) -> bool {
    outbox.has_pending(child_id).await.unwrap_or_else(|e| {
        tracing::warn!(child_id, error = %e, "Could not read offline write queue");
        true
    })
}
