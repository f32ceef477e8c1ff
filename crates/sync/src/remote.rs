//! The remote source of truth, as seen by the offline-first repository.

use async_trait::async_trait;
use covenant_core::models::{NewParticipant, Participant};
use covenant_core::types::DbId;

/// Errors from a [`RemoteService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote could not be reached (transport failure, timeout,
    /// gateway error).
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered and refused the call.
    #[error("remote error ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The remote answered with a body we could not read.
    #[error("invalid remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Child endpoints of the church-management backend.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// `Ok(None)` when the remote has no such child.
    async fn get_child(&self, id: DbId) -> Result<Option<Participant>, RemoteError>;

    async fn list_children(&self, guardian_id: &str) -> Result<Vec<Participant>, RemoteError>;

    async fn search_children(&self, query: &str) -> Result<Vec<Participant>, RemoteError>;

    async fn register_child(&self, input: &NewParticipant) -> Result<Participant, RemoteError>;

    async fn update_child(&self, child: &Participant) -> Result<Participant, RemoteError>;

    async fn delete_child(&self, id: DbId) -> Result<(), RemoteError>;

    async fn check_in(&self, child_id: DbId, resource_id: DbId)
        -> Result<Participant, RemoteError>;

    async fn check_out(&self, child_id: DbId) -> Result<Participant, RemoteError>;
}
