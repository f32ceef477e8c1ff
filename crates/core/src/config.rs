use chrono::Duration;

/// Default lifetime of a check-in request before it expires.
pub const DEFAULT_REQUEST_TTL_MINUTES: i64 = 15;

/// Attempts at an optimistic roster write before reporting a conflict.
pub const DEFAULT_ROSTER_ATTEMPTS: u32 = 5;

/// Tunables for the check-in services.
#[derive(Debug, Clone)]
pub struct CheckInPolicy {
    /// `expires_at = created_at + request_ttl`.
    pub request_ttl: Duration,
    /// Retry bound for waitlist roster writes that lose a version race.
    pub roster_attempts: u32,
}

impl CheckInPolicy {
    pub fn with_ttl_minutes(minutes: i64) -> Self {
        Self {
            request_ttl: Duration::minutes(minutes),
            ..Self::default()
        }
    }
}

impl Default for CheckInPolicy {
    fn default() -> Self {
        Self {
            request_ttl: Duration::minutes(DEFAULT_REQUEST_TTL_MINUTES),
            roster_attempts: DEFAULT_ROSTER_ATTEMPTS,
        }
    }
}
