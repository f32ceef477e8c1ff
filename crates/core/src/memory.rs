//! In-process [`Store`](crate::store::Store) implementation.
//!
//! Used by unit tests and by single-node deployments without PostgreSQL.
//! Each resource lives behind its own mutex, so occupancy changes on one
//! resource never wait on another. The remaining tables are guarded by one
//! mutex each, which gives the per-record atomicity the services rely on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::models::{
    AttendanceRecord, CheckInRequest, NewAttendanceRecord, NewCheckInRequest, NewParticipant,
    NewResource, Participant, RequestTransition, Resource,
};
use crate::status::{AttendanceStatus, ParticipantStatus, RequestStatus};
use crate::store::{
    AttendanceStore, CasOutcome, ParticipantStore, ReleaseOutcome, RequestStore, ReserveOutcome,
    ResourceStore, StoreResult,
};
use crate::types::{ActorId, DbId, Timestamp};

#[derive(Default)]
pub struct MemoryStore {
    resources: RwLock<HashMap<DbId, Arc<Mutex<Resource>>>>,
    participants: Mutex<HashMap<DbId, Participant>>,
    requests: Mutex<HashMap<DbId, CheckInRequest>>,
    attendance: Mutex<HashMap<DbId, AttendanceRecord>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> DbId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn resource_slot(&self, id: DbId) -> Option<Arc<Mutex<Resource>>> {
        self.resources.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn insert_resource(&self, input: &NewResource) -> StoreResult<Resource> {
        let resource = Resource {
            id: self.allocate_id(),
            kind: input.kind,
            name: input.name.clone(),
            capacity: input.capacity,
            occupied: 0,
            accepting_check_ins: input.accepting_check_ins,
            age_min: input.age_min,
            age_max: input.age_max,
            requires_approval: input.requires_approval,
            attendees: Vec::new(),
            waitlist: Vec::new(),
            version: 0,
        };
        self.resources
            .write()
            .await
            .insert(resource.id, Arc::new(Mutex::new(resource.clone())));
        Ok(resource)
    }

    async fn find_resource(&self, id: DbId) -> StoreResult<Option<Resource>> {
        match self.resource_slot(id).await {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn try_reserve(&self, id: DbId) -> StoreResult<ReserveOutcome> {
        let Some(slot) = self.resource_slot(id).await else {
            return Ok(ReserveOutcome::NotFound);
        };
        let mut resource = slot.lock().await;
        if !resource.accepting_check_ins {
            return Ok(ReserveOutcome::NotAccepting);
        }
        if resource.occupied >= resource.capacity {
            return Ok(ReserveOutcome::AtCapacity);
        }
        resource.occupied += 1;
        resource.version += 1;
        Ok(ReserveOutcome::Reserved {
            occupied: resource.occupied,
        })
    }

    async fn try_release(&self, id: DbId) -> StoreResult<ReleaseOutcome> {
        let Some(slot) = self.resource_slot(id).await else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let mut resource = slot.lock().await;
        if resource.occupied <= 0 {
            return Ok(ReleaseOutcome::Underflow);
        }
        resource.occupied -= 1;
        resource.version += 1;
        Ok(ReleaseOutcome::Released {
            occupied: resource.occupied,
        })
    }

    async fn save_roster(&self, updated: &Resource) -> StoreResult<bool> {
        let Some(slot) = self.resource_slot(updated.id).await else {
            return Ok(false);
        };
        let mut resource = slot.lock().await;
        if resource.version != updated.version {
            return Ok(false);
        }
        resource.occupied = updated.occupied;
        resource.attendees = updated.attendees.clone();
        resource.waitlist = updated.waitlist.clone();
        resource.version += 1;
        Ok(true)
    }

    async fn set_accepting(&self, id: DbId, accepting: bool) -> StoreResult<bool> {
        let Some(slot) = self.resource_slot(id).await else {
            return Ok(false);
        };
        let mut resource = slot.lock().await;
        resource.accepting_check_ins = accepting;
        resource.version += 1;
        Ok(true)
    }
}

#[async_trait]
impl ParticipantStore for MemoryStore {
    async fn insert_participant(&self, input: &NewParticipant) -> StoreResult<Participant> {
        let participant = Participant {
            id: self.allocate_id(),
            guardian_id: input.guardian_id.clone(),
            first_name: input.first_name.clone(),
            last_name: input.last_name.clone(),
            birth_date: input.birth_date,
            status: ParticipantStatus::NotInService,
            current_resource_id: None,
            last_check_in: None,
            last_check_out: None,
        };
        self.participants
            .lock()
            .await
            .insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn find_participant(&self, id: DbId) -> StoreResult<Option<Participant>> {
        Ok(self.participants.lock().await.get(&id).cloned())
    }

    async fn list_participants_for_guardian(
        &self,
        guardian_id: &str,
    ) -> StoreResult<Vec<Participant>> {
        let mut children: Vec<Participant> = self
            .participants
            .lock()
            .await
            .values()
            .filter(|p| p.guardian_id == guardian_id)
            .cloned()
            .collect();
        children.sort_by_key(|p| p.id);
        Ok(children)
    }

    async fn mark_checked_in(
        &self,
        id: DbId,
        resource_id: DbId,
        at: Timestamp,
    ) -> StoreResult<CasOutcome> {
        let mut participants = self.participants.lock().await;
        let Some(participant) = participants.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        if participant.status == ParticipantStatus::CheckedIn {
            return Ok(CasOutcome::Stale);
        }
        participant.status = ParticipantStatus::CheckedIn;
        participant.current_resource_id = Some(resource_id);
        participant.last_check_in = Some(at);
        Ok(CasOutcome::Applied)
    }

    async fn mark_checked_out(&self, id: DbId, at: Timestamp) -> StoreResult<CasOutcome> {
        let mut participants = self.participants.lock().await;
        let Some(participant) = participants.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        if participant.status != ParticipantStatus::CheckedIn {
            return Ok(CasOutcome::Stale);
        }
        participant.status = ParticipantStatus::CheckedOut;
        participant.current_resource_id = None;
        participant.last_check_out = Some(at);
        Ok(CasOutcome::Applied)
    }

    async fn restore_participant(&self, snapshot: &Participant) -> StoreResult<()> {
        if let Some(participant) = self.participants.lock().await.get_mut(&snapshot.id) {
            participant.status = snapshot.status;
            participant.current_resource_id = snapshot.current_resource_id;
            participant.last_check_in = snapshot.last_check_in;
            participant.last_check_out = snapshot.last_check_out;
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(&self, input: &NewCheckInRequest) -> StoreResult<CheckInRequest> {
        let mut requests = self.requests.lock().await;
        if requests.values().any(|r| r.token == input.token) {
            return Err(StoreError::Conflict("duplicate check-in token".into()));
        }
        let request = CheckInRequest {
            id: self.allocate_id(),
            participant_id: input.participant_id,
            resource_id: input.resource_id,
            requester_id: input.requester_id.clone(),
            token: input.token.clone(),
            status: RequestStatus::Pending,
            created_at: input.created_at,
            expires_at: input.expires_at,
            processed_by: None,
            processed_at: None,
            rejection_reason: None,
            notes: input.notes.clone(),
            attendance_record_id: None,
        };
        requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: DbId) -> StoreResult<Option<CheckInRequest>> {
        Ok(self.requests.lock().await.get(&id).cloned())
    }

    async fn find_request_by_token(&self, token: &str) -> StoreResult<Option<CheckInRequest>> {
        Ok(self
            .requests
            .lock()
            .await
            .values()
            .find(|r| r.token == token)
            .cloned())
    }

    async fn find_pending_for_participant(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Option<CheckInRequest>> {
        Ok(self
            .requests
            .lock()
            .await
            .values()
            .filter(|r| r.participant_id == participant_id && r.status == RequestStatus::Pending)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn transition_request(
        &self,
        id: DbId,
        transition: &RequestTransition,
    ) -> StoreResult<CasOutcome> {
        let mut requests = self.requests.lock().await;
        let Some(request) = requests.get_mut(&id) else {
            return Ok(CasOutcome::Missing);
        };
        if request.status != RequestStatus::Pending {
            return Ok(CasOutcome::Stale);
        }
        request.status = transition.to;
        request.processed_by = transition.processed_by.clone();
        request.processed_at = Some(transition.processed_at);
        request.rejection_reason = transition.rejection_reason.clone();
        if transition.notes.is_some() {
            request.notes = transition.notes.clone();
        }
        request.attendance_record_id = transition.attendance_record_id;
        Ok(CasOutcome::Applied)
    }

    async fn expire_pending(&self, now: Timestamp) -> StoreResult<Vec<DbId>> {
        let mut requests = self.requests.lock().await;
        let mut expired: Vec<DbId> = requests
            .values_mut()
            .filter(|r| r.status == RequestStatus::Pending && r.expires_at <= now)
            .map(|r| {
                r.status = RequestStatus::Expired;
                r.processed_at = Some(now);
                r.id
            })
            .collect();
        expired.sort_unstable();
        Ok(expired)
    }

    async fn list_pending_for_resource(
        &self,
        resource_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<CheckInRequest>> {
        let mut pending: Vec<CheckInRequest> = self
            .requests
            .lock()
            .await
            .values()
            .filter(|r| r.resource_id == resource_id && r.is_valid_at(now))
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.created_at, r.id));
        Ok(pending)
    }

    async fn list_requests_for_requester(
        &self,
        requester_id: &str,
    ) -> StoreResult<Vec<CheckInRequest>> {
        let mut requests: Vec<CheckInRequest> = self
            .requests
            .lock()
            .await
            .values()
            .filter(|r| r.requester_id == requester_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        Ok(requests)
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn insert_attendance(
        &self,
        input: &NewAttendanceRecord,
    ) -> StoreResult<AttendanceRecord> {
        let mut attendance = self.attendance.lock().await;
        let already_open = attendance.values().any(|r| {
            r.participant_id == input.participant_id && r.status == AttendanceStatus::CheckedIn
        });
        if already_open {
            return Err(StoreError::Conflict(
                "participant already has an open attendance record".into(),
            ));
        }
        let record = AttendanceRecord {
            id: self.allocate_id(),
            participant_id: input.participant_id,
            resource_id: input.resource_id,
            check_in_time: input.check_in_time,
            check_out_time: None,
            checked_in_by: input.checked_in_by.clone(),
            checked_out_by: None,
            status: AttendanceStatus::CheckedIn,
            check_in_request_id: input.check_in_request_id,
            notes: input.notes.clone(),
        };
        attendance.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_open_attendance(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self
            .attendance
            .lock()
            .await
            .values()
            .find(|r| r.participant_id == participant_id && r.status == AttendanceStatus::CheckedIn)
            .cloned())
    }

    async fn close_attendance(
        &self,
        id: DbId,
        at: Timestamp,
        checked_out_by: &ActorId,
        notes: Option<&str>,
    ) -> StoreResult<Option<AttendanceRecord>> {
        let mut attendance = self.attendance.lock().await;
        let Some(record) = attendance.get_mut(&id) else {
            return Ok(None);
        };
        if record.status != AttendanceStatus::CheckedIn {
            return Ok(None);
        }
        record.status = AttendanceStatus::CheckedOut;
        record.check_out_time = Some(at);
        record.checked_out_by = Some(checked_out_by.clone());
        if let Some(notes) = notes {
            record.notes = Some(notes.to_string());
        }
        Ok(Some(record.clone()))
    }

    async fn delete_attendance(&self, id: DbId) -> StoreResult<()> {
        self.attendance.lock().await.remove(&id);
        Ok(())
    }

    async fn list_open_for_resource(
        &self,
        resource_id: DbId,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut open: Vec<AttendanceRecord> = self
            .attendance
            .lock()
            .await
            .values()
            .filter(|r| r.resource_id == resource_id && r.status == AttendanceStatus::CheckedIn)
            .cloned()
            .collect();
        open.sort_by_key(|r| (r.check_in_time, r.id));
        Ok(open)
    }

    async fn list_attendance_for_participant(
        &self,
        participant_id: DbId,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let mut history: Vec<AttendanceRecord> = self
            .attendance
            .lock()
            .await
            .values()
            .filter(|r| r.participant_id == participant_id)
            .cloned()
            .collect();
        history.sort_by_key(|r| std::cmp::Reverse((r.check_in_time, r.id)));
        Ok(history)
    }
}
