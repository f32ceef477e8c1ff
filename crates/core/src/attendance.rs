//! Attendance recorder: check-in and check-out bookkeeping.
//!
//! A check-in flips the participant to `checked_in` with a conditional update
//! (so a double scan loses cleanly) and then opens an attendance record.
//! Capacity is reserved by the caller; check-out releases it.

use std::sync::Arc;

use crate::capacity::{check_eligibility, CapacityLedger};
use crate::clock::Clock;
use crate::error::{CoreError, StoreError};
use crate::models::{AttendanceRecord, NewAttendanceRecord, Participant};
use crate::store::{CasOutcome, SharedStore};
use crate::types::DbId;

#[derive(Clone)]
pub struct AttendanceRecorder {
    store: SharedStore,
    ledger: CapacityLedger,
    clock: Arc<dyn Clock>,
}

impl AttendanceRecorder {
    pub fn new(store: SharedStore, ledger: CapacityLedger, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            ledger,
            clock,
        }
    }

    /// Check a participant in to a resource whose slot is already reserved.
    pub async fn record_check_in(
        &self,
        participant_id: DbId,
        resource_id: DbId,
        checked_in_by: &str,
        notes: Option<String>,
        check_in_request_id: Option<DbId>,
    ) -> Result<AttendanceRecord, CoreError> {
        let (record, _) = self
            .check_in_with_snapshot(
                participant_id,
                resource_id,
                checked_in_by,
                notes,
                check_in_request_id,
            )
            .await?;
        Ok(record)
    }

    /// Like [`record_check_in`](Self::record_check_in), also returning the
    /// participant as it was before, so a later failure can undo the write.
    pub(crate) async fn check_in_with_snapshot(
        &self,
        participant_id: DbId,
        resource_id: DbId,
        checked_in_by: &str,
        notes: Option<String>,
        check_in_request_id: Option<DbId>,
    ) -> Result<(AttendanceRecord, Participant), CoreError> {
        let snapshot = self.load_participant(participant_id).await?;
        if snapshot.is_checked_in() {
            return Err(CoreError::AlreadyCheckedIn);
        }

        let now = self.clock.now();
        match self
            .store
            .mark_checked_in(participant_id, resource_id, now)
            .await?
        {
            CasOutcome::Applied => {}
            CasOutcome::Stale => return Err(CoreError::AlreadyCheckedIn),
            CasOutcome::Missing => return Err(CoreError::not_found("Participant", participant_id)),
        }

        let input = NewAttendanceRecord {
            participant_id,
            resource_id,
            check_in_time: now,
            checked_in_by: checked_in_by.to_string(),
            check_in_request_id,
            notes,
        };
        let record = match self.store.insert_attendance(&input).await {
            Ok(record) => record,
            Err(e) => {
                self.restore(&snapshot).await;
                return Err(match e {
                    StoreError::Conflict(_) => CoreError::AlreadyCheckedIn,
                    other => other.into(),
                });
            }
        };

        tracing::info!(
            participant_id,
            resource_id,
            record_id = record.id,
            checked_in_by,
            "Participant checked in"
        );
        Ok((record, snapshot))
    }

    /// Undo a check-in whose surrounding operation failed.
    pub(crate) async fn revert_check_in(&self, record: &AttendanceRecord, snapshot: &Participant) {
        if let Err(e) = self.store.delete_attendance(record.id).await {
            tracing::error!(record_id = record.id, error = %e, "Failed to delete attendance record during rollback");
        }
        self.restore(snapshot).await;
    }

    /// Staff check-in without a QR request: eligibility, reserve, record.
    pub async fn direct_check_in(
        &self,
        participant_id: DbId,
        resource_id: DbId,
        checked_in_by: &str,
        notes: Option<String>,
    ) -> Result<AttendanceRecord, CoreError> {
        let participant = self.load_participant(participant_id).await?;
        if participant.is_checked_in() {
            return Err(CoreError::AlreadyCheckedIn);
        }
        let resource = self
            .store
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Resource", resource_id))?;
        check_eligibility(&participant, &resource, self.clock.now().date_naive())?;

        self.ledger.reserve(resource_id).await?;
        match self
            .record_check_in(participant_id, resource_id, checked_in_by, notes, None)
            .await
        {
            Ok(record) => Ok(record),
            Err(e) => {
                self.ledger.release_for_rollback(resource_id).await;
                Err(e)
            }
        }
    }

    /// Close the participant's open record and free their slot.
    ///
    /// Once the record is closed the check-out stands; a failed capacity
    /// release afterwards is logged, not returned.
    pub async fn record_check_out(
        &self,
        participant_id: DbId,
        checked_out_by: &str,
        notes: Option<String>,
    ) -> Result<AttendanceRecord, CoreError> {
        let snapshot = self.load_participant(participant_id).await?;
        if !snapshot.is_checked_in() {
            return Err(CoreError::NotCheckedIn);
        }
        let open = self
            .store
            .find_open_attendance(participant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("AttendanceRecord", participant_id))?;

        let now = self.clock.now();
        match self.store.mark_checked_out(participant_id, now).await? {
            CasOutcome::Applied => {}
            CasOutcome::Stale => return Err(CoreError::NotCheckedIn),
            CasOutcome::Missing => return Err(CoreError::not_found("Participant", participant_id)),
        }

        let checked_out_by = checked_out_by.to_string();
        let closed = match self
            .store
            .close_attendance(open.id, now, &checked_out_by, notes.as_deref())
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.restore(&snapshot).await;
                return Err(CoreError::NotCheckedIn);
            }
            Err(e) => {
                self.restore(&snapshot).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.ledger.release(closed.resource_id).await {
            tracing::error!(
                participant_id,
                resource_id = closed.resource_id,
                error = %e,
                "Capacity release after check-out failed"
            );
        }

        tracing::info!(
            participant_id,
            resource_id = closed.resource_id,
            record_id = closed.id,
            duration_minutes = ?closed.duration_minutes(),
            "Participant checked out"
        );
        Ok(closed)
    }

    /// Whole minutes between check-in and check-out; `None` while checked in.
    pub fn duration_minutes(record: &AttendanceRecord) -> Option<i64> {
        record.duration_minutes()
    }

    /// Who is in the room right now.
    pub async fn open_records_for_resource(
        &self,
        resource_id: DbId,
    ) -> Result<Vec<AttendanceRecord>, CoreError> {
        Ok(self.store.list_open_for_resource(resource_id).await?)
    }

    /// Every stay of a participant, newest first.
    pub async fn history_for_participant(
        &self,
        participant_id: DbId,
    ) -> Result<Vec<AttendanceRecord>, CoreError> {
        Ok(self
            .store
            .list_attendance_for_participant(participant_id)
            .await?)
    }

    async fn load_participant(&self, participant_id: DbId) -> Result<Participant, CoreError> {
        self.store
            .find_participant(participant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Participant", participant_id))
    }

    async fn restore(&self, snapshot: &Participant) {
        if let Err(e) = self.store.restore_participant(snapshot).await {
            tracing::error!(participant_id = snapshot.id, error = %e, "Failed to restore participant status");
        }
    }
}
