use serde::Serialize;

/// Outcome of an offline-first repository call.
///
/// `NetworkError` is kept apart from `Error`: the first means the remote
/// could not be reached, the second that it answered and said no.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum RepoResult<T> {
    Success(T),
    Error(String),
    NetworkError(String),
}

impl<T> RepoResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RepoResult<U> {
        match self {
            Self::Success(value) => RepoResult::Success(f(value)),
            Self::Error(msg) => RepoResult::Error(msg),
            Self::NetworkError(msg) => RepoResult::NetworkError(msg),
        }
    }
}
