//! Read and write fallback rules of the offline-first repository.
//!
//! Kept free of I/O so every rule is unit-testable without a network.

use crate::remote::RemoteError;
use crate::result::RepoResult;

/// What a read does given the local cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    /// Answer from the cache; refresh in the background when `refresh`.
    ServeLocal { refresh: bool },
    /// Nothing useful locally: wait for the remote.
    FetchRemote,
}

/// Decide how to serve a read.
///
/// `local_only` marks data that exists only on this device (offline-created
/// children); refreshing it from the remote would find nothing.
pub fn plan_read(local_hit: bool, local_only: bool) -> ReadPlan {
    match (local_hit, local_only) {
        (true, local_only) => ReadPlan::ServeLocal {
            refresh: !local_only,
        },
        (false, _) => ReadPlan::FetchRemote,
    }
}

/// What to do with an optimistic local write once the remote has answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResolution<T> {
    /// The remote accepted; store its canonical value over the local one.
    Commit(T),
    /// The remote was unreachable; keep the local write and retry later.
    KeepLocal(String),
    /// The remote refused; undo the local write.
    Rollback(String),
}

pub fn resolve_write<T>(remote: Result<T, RemoteError>) -> WriteResolution<T> {
    match remote {
        Ok(canonical) => WriteResolution::Commit(canonical),
        Err(RemoteError::Network(msg)) => WriteResolution::KeepLocal(msg),
        Err(e) => WriteResolution::Rollback(e.to_string()),
    }
}

/// Result of a read that had to go to the remote.
pub fn remote_read_result<T>(remote: Result<T, RemoteError>) -> RepoResult<T> {
    match remote {
        Ok(value) => RepoResult::Success(value),
        Err(RemoteError::Network(msg)) => RepoResult::NetworkError(msg),
        Err(e) => RepoResult::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_hit_is_served_and_refreshed() {
        assert_eq!(plan_read(true, false), ReadPlan::ServeLocal { refresh: true });
    }

    #[test]
    fn local_only_hit_is_not_refreshed() {
        assert_eq!(plan_read(true, true), ReadPlan::ServeLocal { refresh: false });
    }

    #[test]
    fn miss_waits_for_remote() {
        assert_eq!(plan_read(false, false), ReadPlan::FetchRemote);
    }

    #[test]
    fn network_error_keeps_local_write() {
        let resolution: WriteResolution<i32> =
            resolve_write(Err(RemoteError::Network("offline".into())));
        assert_eq!(resolution, WriteResolution::KeepLocal("offline".into()));
    }

    #[test]
    fn refusal_rolls_back() {
        let resolution: WriteResolution<i32> = resolve_write(Err(RemoteError::Rejected {
            status: 409,
            message: "duplicate child".into(),
        }));
        assert!(matches!(resolution, WriteResolution::Rollback(msg) if msg.contains("duplicate child")));
    }

    #[test]
    fn success_commits_canonical_value() {
        assert_eq!(resolve_write(Ok(42)), WriteResolution::Commit(42));
    }

    #[test]
    fn remote_read_keeps_error_kinds_apart() {
        assert_eq!(
            remote_read_result::<i32>(Err(RemoteError::Network("down".into()))),
            RepoResult::NetworkError("down".into())
        );
        assert!(matches!(
            remote_read_result::<i32>(Err(RemoteError::Decode("bad json".into()))),
            RepoResult::Error(_)
        ));
    }
}
