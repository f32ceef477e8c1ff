use crate::status::RequestStatus;
use crate::types::DbId;

/// Failure reported by a persistent store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. a token collision).
    #[error("Store conflict: {0}")]
    Conflict(String),

    /// Any other backend failure (connection, query, decoding).
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Domain errors returned by every check-in operation.
///
/// Display strings are user-facing: callers surface them directly rather
/// than mapping to generic failure text.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("check-in request was already {status}")]
    AlreadyProcessed { status: RequestStatus },

    #[error("this check-in request has expired, please create a new one")]
    Expired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("service is at full capacity")]
    AtCapacity,

    #[error("service is not accepting check-ins")]
    ServiceNotAccepting,

    #[error("child is already checked in")]
    AlreadyCheckedIn,

    #[error("child is not checked in")]
    NotCheckedIn,

    #[error("participant is not on the waitlist")]
    NotWaitlisted,

    /// Capacity released with nothing reserved. Indicates a bookkeeping bug.
    #[error("occupancy underflow on resource {resource_id}")]
    Underflow { resource_id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("child already has a pending check-in request")]
    AlreadyPending,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The stable kind of this error, for callers that branch on it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            Self::Expired => ErrorKind::Expired,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::AtCapacity => ErrorKind::AtCapacity,
            Self::ServiceNotAccepting => ErrorKind::ServiceNotAccepting,
            Self::AlreadyCheckedIn => ErrorKind::AlreadyCheckedIn,
            Self::NotCheckedIn => ErrorKind::NotCheckedIn,
            Self::NotWaitlisted => ErrorKind::NotWaitlisted,
            Self::Underflow { .. } => ErrorKind::Underflow,
            Self::Validation(_) => ErrorKind::Validation,
            Self::AlreadyPending => ErrorKind::AlreadyPending,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Stable, serializable error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyProcessed,
    Expired,
    Unauthorized,
    AtCapacity,
    ServiceNotAccepting,
    AlreadyCheckedIn,
    NotCheckedIn,
    NotWaitlisted,
    Underflow,
    Validation,
    AlreadyPending,
    Conflict,
    Storage,
}

impl ErrorKind {
    /// Upper-snake error code used on the wire.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyProcessed => "ALREADY_PROCESSED",
            Self::Expired => "EXPIRED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AtCapacity => "AT_CAPACITY",
            Self::ServiceNotAccepting => "SERVICE_NOT_ACCEPTING",
            Self::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            Self::NotCheckedIn => "NOT_CHECKED_IN",
            Self::NotWaitlisted => "NOT_WAITLISTED",
            Self::Underflow => "UNDERFLOW",
            Self::Validation => "VALIDATION_ERROR",
            Self::AlreadyPending => "ALREADY_PENDING",
            Self::Conflict => "CONFLICT",
            Self::Storage => "INTERNAL_ERROR",
        }
    }
}
