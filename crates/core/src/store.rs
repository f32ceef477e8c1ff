//! Persistent store seams consumed by the check-in services.
//!
//! Backends must make every conditional operation atomic: `try_reserve`
//! and `try_release` serialize per resource, `transition_request` is a
//! compare-and-set keyed on `status = pending`, and the participant and
//! attendance writes are atomic per record. [`crate::memory::MemoryStore`]
//! and `covenant_db::PgStore` are the shipped implementations.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    AttendanceRecord, CheckInRequest, NewAttendanceRecord, NewCheckInRequest, NewParticipant,
    NewResource, Participant, RequestTransition, Resource,
};
use crate::types::{ActorId, DbId, Timestamp};

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an atomic conditional increment of `occupied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { occupied: i32 },
    AtCapacity,
    NotAccepting,
    NotFound,
}

/// Outcome of an atomic conditional decrement of `occupied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { occupied: i32 },
    Underflow,
    NotFound,
}

/// Outcome of a conditional single-row update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The precondition held and the row was written.
    Applied,
    /// The row exists but no longer matches the precondition.
    Stale,
    Missing,
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn insert_resource(&self, input: &NewResource) -> StoreResult<Resource>;

    async fn find_resource(&self, id: DbId) -> StoreResult<Option<Resource>>;

    /// Increment `occupied` iff `occupied < capacity` and the resource is
    /// accepting check-ins. Bumps `version`.
    async fn try_reserve(&self, id: DbId) -> StoreResult<ReserveOutcome>;

    /// Decrement `occupied` iff it is positive. Bumps `version`.
    async fn try_release(&self, id: DbId) -> StoreResult<ReleaseOutcome>;

    /// Write `occupied`, `attendees` and `waitlist` iff the stored version
    /// still equals `resource.version`. Returns `false` on a version miss.
    async fn save_roster(&self, resource: &Resource) -> StoreResult<bool>;

    async fn set_accepting(&self, id: DbId, accepting: bool) -> StoreResult<bool>;
}

#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn insert_participant(&self, input: &NewParticipant) -> StoreResult<Participant>;

    async fn find_participant(&self, id: DbId) -> StoreResult<Option<Participant>>;

    async fn list_participants_for_guardian(
        &self,
        guardian_id: &str,
    ) -> StoreResult<Vec<Participant>>;

    /// Set `checked_in` at `resource_id` iff the participant is not already
    /// checked in.
    async fn mark_checked_in(
        &self,
        id: DbId,
        resource_id: DbId,
        at: Timestamp,
    ) -> StoreResult<CasOutcome>;

    /// Set `checked_out` and clear the resource iff currently checked in.
    async fn mark_checked_out(&self, id: DbId, at: Timestamp) -> StoreResult<CasOutcome>;

    /// Overwrite the status fields with a previously read snapshot.
    async fn restore_participant(&self, snapshot: &Participant) -> StoreResult<()>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(&self, input: &NewCheckInRequest) -> StoreResult<CheckInRequest>;

    async fn find_request(&self, id: DbId) -> StoreResult<Option<CheckInRequest>>;

    /// Exact, case-sensitive token match.
    async fn find_request_by_token(&self, token: &str) -> StoreResult<Option<CheckInRequest>>;

    async fn find_pending_for_participant(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Option<CheckInRequest>>;

    /// Compare-and-set from `pending` to `transition.to`.
    async fn transition_request(
        &self,
        id: DbId,
        transition: &RequestTransition,
    ) -> StoreResult<CasOutcome>;

    /// Move every pending request with `expires_at <= now` to `expired`.
    /// Returns the ids this call transitioned.
    async fn expire_pending(&self, now: Timestamp) -> StoreResult<Vec<DbId>>;

    /// Pending, unexpired requests for a resource, oldest first.
    async fn list_pending_for_resource(
        &self,
        resource_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<CheckInRequest>>;

    /// Every request created by `requester_id`, newest first.
    async fn list_requests_for_requester(
        &self,
        requester_id: &str,
    ) -> StoreResult<Vec<CheckInRequest>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn insert_attendance(&self, input: &NewAttendanceRecord)
        -> StoreResult<AttendanceRecord>;

    async fn find_open_attendance(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Close a `checked_in` record. Returns `None` if it was already closed.
    async fn close_attendance(
        &self,
        id: DbId,
        at: Timestamp,
        checked_out_by: &ActorId,
        notes: Option<&str>,
    ) -> StoreResult<Option<AttendanceRecord>>;

    /// Remove a record written by a step that was later rolled back.
    async fn delete_attendance(&self, id: DbId) -> StoreResult<()>;

    async fn list_open_for_resource(&self, resource_id: DbId)
        -> StoreResult<Vec<AttendanceRecord>>;

    async fn list_attendance_for_participant(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Vec<AttendanceRecord>>;
}

/// Everything the check-in services need from persistence.
pub trait Store: ResourceStore + ParticipantStore + RequestStore + AttendanceStore {}

impl<T> Store for T where T: ResourceStore + ParticipantStore + RequestStore + AttendanceStore {}

pub type SharedStore = Arc<dyn Store>;
