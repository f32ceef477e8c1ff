//! Offline-first repository behaviour against a scripted remote.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use covenant_core::clock::ManualClock;
use covenant_core::models::{NewParticipant, Participant};
use covenant_core::status::ParticipantStatus;
use covenant_core::types::DbId;
use covenant_sync::{
    FileCache, LocalCache, MemoryCache, OfflineFirstRepository, PendingWrite, RemoteError, RemoteService,
    RepoResult, SyncConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Online,
    Offline,
    Refusing,
    Slow,
}

/// In-memory stand-in for the church backend.
struct ScriptedRemote {
    mode: Mutex<Mode>,
    children: Mutex<BTreeMap<DbId, Participant>>,
    next_id: AtomicI64,
}

impl ScriptedRemote {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            children: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(100),
        })
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn seed(&self, child: Participant) {
        self.children.lock().unwrap().insert(child.id, child);
    }

    fn stored(&self, id: DbId) -> Option<Participant> {
        self.children.lock().unwrap().get(&id).cloned()
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Online => Ok(()),
            Mode::Offline => Err(RemoteError::Network("connection refused".into())),
            Mode::Refusing => Err(RemoteError::Rejected {
                status: 422,
                message: "refused by server".into(),
            }),
            Mode::Slow => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            }
        }
    }

    fn update_stored(
        &self,
        id: DbId,
        change: impl FnOnce(&mut Participant),
    ) -> Result<Participant, RemoteError> {
        let mut children = self.children.lock().unwrap();
        let child = children.get_mut(&id).ok_or_else(|| RemoteError::Rejected {
            status: 404,
            message: "child not found".into(),
        })?;
        change(child);
        Ok(child.clone())
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn get_child(&self, id: DbId) -> Result<Option<Participant>, RemoteError> {
        self.gate().await?;
        Ok(self.stored(id))
    }

    async fn list_children(&self, guardian_id: &str) -> Result<Vec<Participant>, RemoteError> {
        self.gate().await?;
        let children = self.children.lock().unwrap();
        let found = children
            .values()
            .filter(|c| c.guardian_id == guardian_id)
            .cloned()
            .collect();
        Ok(found)
    }

    async fn search_children(&self, query: &str) -> Result<Vec<Participant>, RemoteError> {
        self.gate().await?;
        let needle = query.to_lowercase();
        let children = self.children.lock().unwrap();
        let found = children
            .values()
            .filter(|c| c.first_name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Ok(found)
    }

    async fn register_child(&self, input: &NewParticipant) -> Result<Participant, RemoteError> {
        self.gate().await?;
        let child = Participant {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            guardian_id: input.guardian_id.clone(),
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            birth_date: input.birth_date,
            status: ParticipantStatus::NotInService,
            current_resource_id: None,
            last_check_in: None,
            last_check_out: None,
        };
        self.seed(child.clone());
        Ok(child)
    }

    async fn update_child(&self, child: &Participant) -> Result<Participant, RemoteError> {
        self.gate().await?;
        let incoming = child.clone();
        self.update_stored(child.id, move |stored| *stored = incoming)
    }

    async fn delete_child(&self, id: DbId) -> Result<(), RemoteError> {
        self.gate().await?;
        self.children.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn check_in(
        &self,
        child_id: DbId,
        resource_id: DbId,
    ) -> Result<Participant, RemoteError> {
        self.gate().await?;
        self.update_stored(child_id, |c| {
            c.status = ParticipantStatus::CheckedIn;
            c.current_resource_id = Some(resource_id);
            c.last_check_in = Some(Utc::now());
        })
    }

    async fn check_out(&self, child_id: DbId) -> Result<Participant, RemoteError> {
        self.gate().await?;
        self.update_stored(child_id, |c| {
            c.status = ParticipantStatus::CheckedOut;
            c.current_resource_id = None;
            c.last_check_out = Some(Utc::now());
        })
    }
}

fn new_child(first_name: &str) -> NewParticipant {
    NewParticipant {
        guardian_id: "guardian-1".into(),
        first_name: first_name.into(),
        last_name: "Silva".into(),
        birth_date: None,
    }
}

fn server_child(id: DbId, first_name: &str) -> Participant {
    Participant {
        id,
        guardian_id: "guardian-1".into(),
        first_name: first_name.into(),
        last_name: "Silva".into(),
        birth_date: None,
        status: ParticipantStatus::NotInService,
        current_resource_id: None,
        last_check_in: None,
        last_check_out: None,
    }
}

fn repository(remote: Arc<ScriptedRemote>) -> (OfflineFirstRepository, Arc<MemoryCache>) {
    repository_with_timeout(remote, Duration::from_secs(20))
}

fn repository_with_timeout(
    remote: Arc<ScriptedRemote>,
    timeout: Duration,
) -> (OfflineFirstRepository, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 4, 9, 30, 0).unwrap(),
    ));
    let repo = OfflineFirstRepository::new(remote, cache.clone(), clock, timeout);
    (repo, cache)
}

#[tokio::test]
async fn offline_registration_is_kept_locally_and_flushed_later() {
    let remote = ScriptedRemote::new(Mode::Offline);
    let (repo, _) = repository(remote.clone());

    let local = repo.register_child(new_child("Maya")).await.success().unwrap();
    assert!(local.id < 0);
    assert_eq!(repo.get_child(local.id).await, RepoResult::Success(local.clone()));
    assert_matches!(
        repo.pending_writes().await.unwrap().as_slice(),
        [PendingWrite::Register { local_id, .. }] if *local_id == local.id
    );

    // Still offline: nothing is delivered and nothing is lost.
    assert_matches!(repo.flush_pending().await, RepoResult::NetworkError(_));
    assert_eq!(repo.pending_writes().await.unwrap().len(), 1);

    remote.set_mode(Mode::Online);
    assert_eq!(repo.flush_pending().await, RepoResult::Success(1));
    assert!(repo.pending_writes().await.unwrap().is_empty());
    assert_eq!(repo.get_cached_child(local.id).await, None);

    let children = repo.list_children("guardian-1").await.success().unwrap();
    assert_eq!(children.len(), 1);
    assert!(children[0].id > 0);
    assert_eq!(children[0].first_name, "Maya");
}

#[tokio::test]
async fn offline_writes_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("children.json");
    let remote = ScriptedRemote::new(Mode::Offline);
    let clock = Arc::new(ManualClock::default());
    let timeout = Duration::from_secs(20);

    let local = {
        let cache = Arc::new(FileCache::open(&path).await.unwrap());
        let repo = OfflineFirstRepository::new(remote.clone(), cache, clock.clone(), timeout);
        let local = repo.register_child(new_child("Maya")).await.success().unwrap();
        repo.check_in(local.id, 6).await.success().unwrap();
        local
    };

    let cache = Arc::new(FileCache::open(&path).await.unwrap());
    let repo = OfflineFirstRepository::new(remote.clone(), cache, clock, timeout);
    assert_eq!(
        repo.get_cached_child(local.id).await.map(|c| c.status),
        Some(ParticipantStatus::CheckedIn)
    );
    assert_matches!(
        repo.pending_writes().await.unwrap().as_slice(),
        [PendingWrite::Register { local_id, .. }, PendingWrite::CheckIn { child_id, resource_id: 6 }]
            if *local_id == local.id && *child_id == local.id
    );

    remote.set_mode(Mode::Online);
    assert_eq!(repo.flush_pending().await, RepoResult::Success(2));
    assert!(repo.pending_writes().await.unwrap().is_empty());
    assert_eq!(repo.get_cached_child(local.id).await, None);
    assert_eq!(
        remote.stored(100).map(|c| c.status),
        Some(ParticipantStatus::CheckedIn)
    );

    drop(repo);
    let settled = FileCache::open(&path).await.unwrap();
    assert!(settled.load_pending().await.unwrap().is_empty());
    assert!(settled.get(100).await.unwrap().is_some());
}

#[tokio::test]
async fn refused_registration_is_rolled_back() {
    let remote = ScriptedRemote::new(Mode::Refusing);
    let (repo, cache) = repository(remote);

    assert_matches!(
        repo.register_child(new_child("Maya")).await,
        RepoResult::Error(msg) if msg.contains("refused by server")
    );
    assert!(cache.list_for_guardian("guardian-1").await.unwrap().is_empty());
    assert!(repo.pending_writes().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_registration_never_reaches_the_cache() {
    let remote = ScriptedRemote::new(Mode::Online);
    let (repo, cache) = repository(remote);

    assert_matches!(repo.register_child(new_child("")).await, RepoResult::Error(_));
    assert!(cache.list_for_guardian("guardian-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn online_registration_uses_server_id() {
    let remote = ScriptedRemote::new(Mode::Online);
    let (repo, cache) = repository(remote.clone());

    let child = repo.register_child(new_child("Maya")).await.success().unwrap();
    assert_eq!(child.id, 100);
    assert_eq!(cache.get(100).await.unwrap(), Some(child));
    assert_eq!(cache.get(-1).await.unwrap(), None);
}

#[tokio::test]
async fn read_miss_keeps_network_and_remote_errors_apart() {
    let remote = ScriptedRemote::new(Mode::Offline);
    let (repo, _) = repository(remote.clone());

    assert_matches!(repo.get_child(5).await, RepoResult::NetworkError(_));

    remote.set_mode(Mode::Refusing);
    assert_matches!(repo.get_child(5).await, RepoResult::Error(_));

    remote.set_mode(Mode::Online);
    assert_matches!(repo.get_child(5).await, RepoResult::Error(msg) if msg.contains("not found"));
}

#[tokio::test]
async fn read_miss_populates_cache() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(7, "Theo"));
    let (repo, cache) = repository(remote.clone());

    assert_eq!(
        repo.get_child(7).await,
        RepoResult::Success(server_child(7, "Theo"))
    );
    assert_eq!(cache.get(7).await.unwrap(), Some(server_child(7, "Theo")));

    // Served locally from now on, even with the remote gone.
    remote.set_mode(Mode::Offline);
    assert!(repo.get_child(7).await.is_success());
    repo.wait_for_refreshes().await;
}

#[tokio::test]
async fn local_hit_is_refreshed_in_background() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(1, "Renamed"));
    let (repo, cache) = repository(remote);
    cache.put(server_child(1, "Original")).await.unwrap();

    assert_eq!(
        repo.get_child(1).await,
        RepoResult::Success(server_child(1, "Original"))
    );
    repo.wait_for_refreshes().await;
    assert_eq!(
        repo.get_cached_child(1).await.map(|c| c.first_name),
        Some("Renamed".to_string())
    );
}

#[tokio::test]
async fn failed_background_refresh_is_not_surfaced() {
    let remote = ScriptedRemote::new(Mode::Offline);
    let (repo, cache) = repository(remote);
    cache.put(server_child(1, "Original")).await.unwrap();

    let listed = repo.list_children("guardian-1").await;
    assert_eq!(listed, RepoResult::Success(vec![server_child(1, "Original")]));
    repo.wait_for_refreshes().await;
    assert_eq!(cache.get(1).await.unwrap(), Some(server_child(1, "Original")));
}

#[tokio::test]
async fn offline_check_in_survives_refresh_and_is_delivered() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(3, "Ana"));
    let (repo, _) = repository(remote.clone());
    repo.get_child(3).await.success().unwrap();

    remote.set_mode(Mode::Offline);
    let checked_in = repo.check_in(3, 42).await.success().unwrap();
    assert_eq!(checked_in.status, ParticipantStatus::CheckedIn);
    assert_eq!(checked_in.current_resource_id, Some(42));

    // The remote comes back but still has the stale state; the refresh must
    // not clobber the undelivered check-in.
    remote.set_mode(Mode::Online);
    repo.get_child(3).await;
    repo.wait_for_refreshes().await;
    assert_eq!(
        repo.get_cached_child(3).await.map(|c| c.status),
        Some(ParticipantStatus::CheckedIn)
    );

    assert_eq!(repo.flush_pending().await, RepoResult::Success(1));
    assert_eq!(
        remote.stored(3).map(|c| c.status),
        Some(ParticipantStatus::CheckedIn)
    );
}

#[tokio::test]
async fn double_check_in_is_refused_locally() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(3, "Ana"));
    let (repo, _) = repository(remote);

    repo.get_child(3).await.success().unwrap();
    assert!(repo.check_in(3, 42).await.is_success());
    assert_matches!(
        repo.check_in(3, 42).await,
        RepoResult::Error(msg) if msg.contains("already checked in")
    );
    assert!(repo.check_out(3).await.is_success());
    assert_matches!(repo.check_out(3).await, RepoResult::Error(_));
}

#[tokio::test]
async fn refused_update_restores_previous_value() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(9, "Lena"));
    let (repo, _) = repository(remote.clone());
    repo.get_child(9).await.success().unwrap();

    remote.set_mode(Mode::Refusing);
    let mut renamed = server_child(9, "Helena");
    renamed.last_name = "Moreau".into();
    assert_matches!(repo.update_child(renamed).await, RepoResult::Error(_));
    assert_eq!(repo.get_cached_child(9).await, Some(server_child(9, "Lena")));
}

#[tokio::test]
async fn refused_delete_restores_child() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(9, "Lena"));
    let (repo, _) = repository(remote.clone());
    repo.get_child(9).await.success().unwrap();

    remote.set_mode(Mode::Refusing);
    assert_matches!(repo.delete_child(9).await, RepoResult::Error(_));
    assert!(repo.get_cached_child(9).await.is_some());

    remote.set_mode(Mode::Online);
    assert_eq!(repo.delete_child(9).await, RepoResult::Success(()));
    assert!(repo.get_cached_child(9).await.is_none());
    assert!(remote.stored(9).is_none());
}

#[tokio::test]
async fn deleting_an_offline_child_drops_its_queued_writes() {
    let remote = ScriptedRemote::new(Mode::Offline);
    let (repo, _) = repository(remote.clone());

    let local = repo.register_child(new_child("Maya")).await.success().unwrap();
    assert!(repo.check_in(local.id, 1).await.is_success());
    assert_eq!(repo.pending_writes().await.unwrap().len(), 2);

    assert_eq!(repo.delete_child(local.id).await, RepoResult::Success(()));
    assert!(repo.pending_writes().await.unwrap().is_empty());

    remote.set_mode(Mode::Online);
    assert_eq!(repo.flush_pending().await, RepoResult::Success(0));
}

#[tokio::test]
async fn queued_writes_follow_the_server_id() {
    let remote = ScriptedRemote::new(Mode::Offline);
    let (repo, _) = repository(remote.clone());

    let local = repo.register_child(new_child("Maya")).await.success().unwrap();
    repo.check_in(local.id, 5).await.success().unwrap();

    remote.set_mode(Mode::Online);
    assert_eq!(repo.flush_pending().await, RepoResult::Success(2));

    let server = remote.stored(100).unwrap();
    assert_eq!(server.status, ParticipantStatus::CheckedIn);
    assert_eq!(server.current_resource_id, Some(5));
    assert_eq!(
        repo.get_cached_child(100).await.map(|c| c.status),
        Some(ParticipantStatus::CheckedIn)
    );
}

#[tokio::test]
async fn slow_remote_times_out_as_network_error() {
    let remote = ScriptedRemote::new(Mode::Slow);
    let (repo, _) = repository_with_timeout(remote, Duration::from_millis(20));

    assert_matches!(repo.get_child(1).await, RepoResult::NetworkError(msg) if msg.contains("timed out"));
    assert_matches!(
        repo.search_children("an").await,
        RepoResult::NetworkError(_)
    );
}

#[tokio::test]
async fn search_miss_fetches_from_remote() {
    let remote = ScriptedRemote::new(Mode::Online);
    remote.seed(server_child(11, "Oscar"));
    let (repo, cache) = repository(remote);

    let found = repo.search_children("osc").await.success().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(cache.search("osc").await.unwrap().len(), 1);
}

#[tokio::test]
async fn from_config_opens_file_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        cache_path: Some(dir.path().join("children.json")),
        ..SyncConfig::default()
    };
    let repo = OfflineFirstRepository::from_config(&config, Arc::new(ManualClock::default()))
        .await
        .unwrap();
    assert_eq!(repo.get_cached_child(1).await, None);
}
