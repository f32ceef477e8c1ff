//! Offline-first access to child records.
//!
//! [`OfflineFirstRepository`] answers reads from a [`LocalCache`] and keeps
//! it fresh from a [`RemoteService`]; writes land locally first and are
//! reconciled with the remote according to [`policy`].

pub mod cache;
pub mod config;
pub mod http;
pub mod outbox;
pub mod policy;
pub mod remote;
pub mod repository;
pub mod result;

pub use cache::{CacheError, FileCache, LocalCache, MemoryCache};
pub use config::SyncConfig;
pub use http::HttpRemoteService;
pub use outbox::PendingWrite;
pub use remote::{RemoteError, RemoteService};
pub use repository::{OfflineFirstRepository, SetupError};
pub use result::RepoResult;
