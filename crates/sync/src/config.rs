use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single remote call.
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 20;

/// Offline-first repository configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of the children API.
    pub remote_base_url: String,
    /// Bound on every remote call; exceeding it is a network error.
    pub remote_timeout: Duration,
    /// Where the JSON cache snapshot lives. `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
}

impl SyncConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                        |
    /// |-----------------------|--------------------------------|
    /// | `REMOTE_BASE_URL`     | `http://localhost:3000/api/v1` |
    /// | `REMOTE_TIMEOUT_SECS` | `20`                           |
    /// | `LOCAL_CACHE_PATH`    | unset (in-memory cache)        |
    pub fn from_env() -> Self {
        let remote_base_url = std::env::var("REMOTE_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api/v1".into());

        let remote_timeout_secs: u64 = std::env::var("REMOTE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REMOTE_TIMEOUT_SECS.to_string())
            .parse()
            .expect("REMOTE_TIMEOUT_SECS must be a valid u64");

        let cache_path = std::env::var("LOCAL_CACHE_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            remote_base_url,
            remote_timeout: Duration::from_secs(remote_timeout_secs),
            cache_path,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_base_url: "http://localhost:3000/api/v1".into(),
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            cache_path: None,
        }
    }
}
