/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque identity of an authenticated actor (guardian, staff member, system).
///
/// Supplied by the identity provider; the core trusts it as-is.
pub type ActorId = String;
