//! [`PgStore`]: the core store traits over PostgreSQL.
//!
//! Conditional writes are single UPDATE statements with the guard in the
//! WHERE clause; a zero-row result is then classified by re-reading the row.

use async_trait::async_trait;
use covenant_core::error::StoreError;
use covenant_core::models::{
    AttendanceRecord, CheckInRequest, NewAttendanceRecord, NewCheckInRequest, NewParticipant,
    NewResource, Participant, RequestTransition, Resource,
};
use covenant_core::store::{
    AttendanceStore, CasOutcome, ParticipantStore, ReleaseOutcome, RequestStore, ReserveOutcome,
    ResourceStore, StoreResult,
};
use covenant_core::types::{ActorId, DbId, Timestamp};

use crate::repositories::{AttendanceRepo, CheckInRequestRepo, ParticipantRepo, ResourceRepo};
use crate::DbPool;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a sqlx error onto the store error kinds.
///
/// PostgreSQL unique violations (23505) become [`StoreError::Conflict`];
/// everything else is a backend failure.
fn store_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown");
            return StoreError::Conflict(format!(
                "duplicate value violates unique constraint: {constraint}"
            ));
        }
    }
    tracing::error!(error = %err, "Database error");
    StoreError::Backend(err.to_string())
}

fn collect<R, T>(rows: Vec<R>, convert: impl Fn(R) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.into_iter().map(convert).collect()
}

#[async_trait]
impl ResourceStore for PgStore {
    async fn insert_resource(&self, input: &NewResource) -> StoreResult<Resource> {
        ResourceRepo::create(&self.pool, input)
            .await
            .map_err(store_err)?
            .into_domain()
    }

    async fn find_resource(&self, id: DbId) -> StoreResult<Option<Resource>> {
        ResourceRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn try_reserve(&self, id: DbId) -> StoreResult<ReserveOutcome> {
        if let Some(occupied) = ResourceRepo::try_reserve(&self.pool, id)
            .await
            .map_err(store_err)?
        {
            return Ok(ReserveOutcome::Reserved { occupied });
        }
        Ok(match self.find_resource(id).await? {
            None => ReserveOutcome::NotFound,
            Some(r) if !r.accepting_check_ins => ReserveOutcome::NotAccepting,
            Some(_) => ReserveOutcome::AtCapacity,
        })
    }

    async fn try_release(&self, id: DbId) -> StoreResult<ReleaseOutcome> {
        if let Some(occupied) = ResourceRepo::try_release(&self.pool, id)
            .await
            .map_err(store_err)?
        {
            return Ok(ReleaseOutcome::Released { occupied });
        }
        Ok(match self.find_resource(id).await? {
            None => ReleaseOutcome::NotFound,
            Some(_) => ReleaseOutcome::Underflow,
        })
    }

    async fn save_roster(&self, resource: &Resource) -> StoreResult<bool> {
        ResourceRepo::save_roster(&self.pool, resource)
            .await
            .map_err(store_err)
    }

    async fn set_accepting(&self, id: DbId, accepting: bool) -> StoreResult<bool> {
        ResourceRepo::set_accepting(&self.pool, id, accepting)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl ParticipantStore for PgStore {
    async fn insert_participant(&self, input: &NewParticipant) -> StoreResult<Participant> {
        ParticipantRepo::create(&self.pool, input)
            .await
            .map_err(store_err)?
            .into_domain()
    }

    async fn find_participant(&self, id: DbId) -> StoreResult<Option<Participant>> {
        ParticipantRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn list_participants_for_guardian(
        &self,
        guardian_id: &str,
    ) -> StoreResult<Vec<Participant>> {
        let rows = ParticipantRepo::list_for_guardian(&self.pool, guardian_id)
            .await
            .map_err(store_err)?;
        collect(rows, |row| row.into_domain())
    }

    async fn mark_checked_in(
        &self,
        id: DbId,
        resource_id: DbId,
        at: Timestamp,
    ) -> StoreResult<CasOutcome> {
        let applied = ParticipantRepo::mark_checked_in(&self.pool, id, resource_id, at)
            .await
            .map_err(store_err)?;
        self.participant_outcome(id, applied).await
    }

    async fn mark_checked_out(&self, id: DbId, at: Timestamp) -> StoreResult<CasOutcome> {
        let applied = ParticipantRepo::mark_checked_out(&self.pool, id, at)
            .await
            .map_err(store_err)?;
        self.participant_outcome(id, applied).await
    }

    async fn restore_participant(&self, snapshot: &Participant) -> StoreResult<()> {
        ParticipantRepo::restore(&self.pool, snapshot)
            .await
            .map_err(store_err)
    }
}

impl PgStore {
    async fn participant_outcome(&self, id: DbId, applied: bool) -> StoreResult<CasOutcome> {
        if applied {
            return Ok(CasOutcome::Applied);
        }
        let exists = ParticipantRepo::exists(&self.pool, id)
            .await
            .map_err(store_err)?;
        Ok(if exists {
            CasOutcome::Stale
        } else {
            CasOutcome::Missing
        })
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert_request(&self, input: &NewCheckInRequest) -> StoreResult<CheckInRequest> {
        CheckInRequestRepo::create(&self.pool, input)
            .await
            .map_err(store_err)?
            .into_domain()
    }

    async fn find_request(&self, id: DbId) -> StoreResult<Option<CheckInRequest>> {
        CheckInRequestRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn find_request_by_token(&self, token: &str) -> StoreResult<Option<CheckInRequest>> {
        CheckInRequestRepo::find_by_token(&self.pool, token)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn find_pending_for_participant(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Option<CheckInRequest>> {
        CheckInRequestRepo::find_pending_for_participant(&self.pool, participant_id)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn transition_request(
        &self,
        id: DbId,
        transition: &RequestTransition,
    ) -> StoreResult<CasOutcome> {
        if CheckInRequestRepo::transition(&self.pool, id, transition)
            .await
            .map_err(store_err)?
        {
            return Ok(CasOutcome::Applied);
        }
        Ok(match self.find_request(id).await? {
            Some(_) => CasOutcome::Stale,
            None => CasOutcome::Missing,
        })
    }

    async fn expire_pending(&self, now: Timestamp) -> StoreResult<Vec<DbId>> {
        CheckInRequestRepo::expire_pending(&self.pool, now)
            .await
            .map_err(store_err)
    }

    async fn list_pending_for_resource(
        &self,
        resource_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<CheckInRequest>> {
        let rows = CheckInRequestRepo::list_pending_for_resource(&self.pool, resource_id, now)
            .await
            .map_err(store_err)?;
        collect(rows, |row| row.into_domain())
    }

    async fn list_requests_for_requester(
        &self,
        requester_id: &str,
    ) -> StoreResult<Vec<CheckInRequest>> {
        let rows = CheckInRequestRepo::list_for_requester(&self.pool, requester_id)
            .await
            .map_err(store_err)?;
        collect(rows, |row| row.into_domain())
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn insert_attendance(
        &self,
        input: &NewAttendanceRecord,
    ) -> StoreResult<AttendanceRecord> {
        AttendanceRepo::create(&self.pool, input)
            .await
            .map_err(store_err)?
            .into_domain()
    }

    async fn find_open_attendance(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        AttendanceRepo::find_open_for_participant(&self.pool, participant_id)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn close_attendance(
        &self,
        id: DbId,
        at: Timestamp,
        checked_out_by: &ActorId,
        notes: Option<&str>,
    ) -> StoreResult<Option<AttendanceRecord>> {
        AttendanceRepo::close(&self.pool, id, at, checked_out_by, notes)
            .await
            .map_err(store_err)?
            .map(|row| row.into_domain())
            .transpose()
    }

    async fn delete_attendance(&self, id: DbId) -> StoreResult<()> {
        AttendanceRepo::delete(&self.pool, id)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn list_open_for_resource(
        &self,
        resource_id: DbId,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = AttendanceRepo::list_open_for_resource(&self.pool, resource_id)
            .await
            .map_err(store_err)?;
        collect(rows, |row| row.into_domain())
    }

    async fn list_attendance_for_participant(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = AttendanceRepo::list_for_participant(&self.pool, participant_id)
            .await
            .map_err(store_err)?;
        collect(rows, |row| row.into_domain())
    }
}
