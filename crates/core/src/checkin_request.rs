//! Check-in request state machine.
//!
//! ```text
//! PENDING ──approve──▶ APPROVED
//!    │  ├──reject───▶ REJECTED
//!    │  ├──cancel───▶ CANCELLED
//!    └──expire/sweep▶ EXPIRED
//! ```
//!
//! Every transition is one compare-and-set keyed on `status = pending`, so
//! concurrent approve/reject/cancel/sweep calls have exactly one winner. The
//! losers read the status that won and report it as a typed error.

use std::sync::Arc;

use crate::attendance::AttendanceRecorder;
use crate::capacity::{check_eligibility, CapacityLedger};
use crate::clock::Clock;
use crate::config::CheckInPolicy;
use crate::error::{CoreError, StoreError};
use crate::models::{AttendanceRecord, CheckInRequest, NewCheckInRequest, RequestTransition};
use crate::status::RequestStatus;
use crate::store::{CasOutcome, SharedStore};
use crate::token::{generate_token, is_well_formed};
use crate::types::{DbId, Timestamp};

/// Token collisions are astronomically unlikely; a few retries is plenty.
const MAX_TOKEN_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct CheckInRequestService {
    store: SharedStore,
    ledger: CapacityLedger,
    recorder: AttendanceRecorder,
    clock: Arc<dyn Clock>,
    policy: CheckInPolicy,
}

impl CheckInRequestService {
    pub fn new(
        store: SharedStore,
        ledger: CapacityLedger,
        recorder: AttendanceRecorder,
        clock: Arc<dyn Clock>,
        policy: CheckInPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            recorder,
            clock,
            policy,
        }
    }

    /// Issue a new QR-code request for a guardian.
    ///
    /// Checks eligibility and availability up front without reserving;
    /// capacity is only taken on approval.
    pub async fn create(
        &self,
        participant_id: DbId,
        resource_id: DbId,
        requester_id: &str,
        notes: Option<String>,
    ) -> Result<CheckInRequest, CoreError> {
        let participant = self
            .store
            .find_participant(participant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Participant", participant_id))?;
        let resource = self
            .store
            .find_resource(resource_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Resource", resource_id))?;

        let now = self.clock.now();
        if participant.is_checked_in() {
            return Err(CoreError::AlreadyCheckedIn);
        }
        check_eligibility(&participant, &resource, now.date_naive())?;
        if !resource.accepting_check_ins {
            return Err(CoreError::ServiceNotAccepting);
        }
        if resource.is_full() {
            return Err(CoreError::AtCapacity);
        }

        if let Some(existing) = self.store.find_pending_for_participant(participant_id).await? {
            if existing.is_valid_at(now) {
                return Err(CoreError::AlreadyPending);
            }
            // Stale but not yet swept; retire it so the new one is the only pending request.
            self.expire(&existing, now).await?;
        }

        let mut attempt = 0;
        let request = loop {
            attempt += 1;
            let input = NewCheckInRequest {
                participant_id,
                resource_id,
                requester_id: requester_id.to_string(),
                token: generate_token(),
                created_at: now,
                expires_at: now + self.policy.request_ttl,
                notes: notes.clone(),
            };
            match self.store.insert_request(&input).await {
                Ok(request) => break request,
                Err(StoreError::Conflict(msg)) if attempt < MAX_TOKEN_ATTEMPTS => {
                    tracing::warn!(attempt, %msg, "Check-in token collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(
            request_id = request.id,
            participant_id,
            resource_id,
            requester_id,
            expires_at = %request.expires_at,
            "Check-in request created"
        );
        Ok(request)
    }

    /// Exact, case-sensitive token lookup.
    pub async fn get_by_token(&self, token: &str) -> Result<CheckInRequest, CoreError> {
        if !is_well_formed(token) {
            return Err(CoreError::not_found("CheckInRequest", "token"));
        }
        self.store
            .find_request_by_token(token)
            .await?
            .ok_or_else(|| CoreError::not_found("CheckInRequest", "token"))
    }

    /// `true` while the request is pending and unexpired.
    pub fn is_valid(&self, request: &CheckInRequest) -> bool {
        request.is_valid_at(self.clock.now())
    }

    /// Approve a scanned request: reserve a slot, check the child in, and
    /// mark the request approved. Steps that already ran are undone if a later
    /// one fails.
    pub async fn approve(
        &self,
        token: &str,
        approver_id: &str,
        notes: Option<String>,
    ) -> Result<AttendanceRecord, CoreError> {
        let request = self.get_by_token(token).await?;
        let now = self.clock.now();
        self.ensure_pending(&request, now).await?;
        self.approve_pending(&request, approver_id, notes, now).await
    }

    /// Everything after the guard. Another actor may settle the request at
    /// any point in here; the compare-and-set at the end decides who won.
    async fn approve_pending(
        &self,
        request: &CheckInRequest,
        approver_id: &str,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<AttendanceRecord, CoreError> {
        if let Err(e) = self.ledger.reserve(request.resource_id).await {
            return Err(self.settled_or(request.id, e).await);
        }

        let (record, snapshot) = match self
            .recorder
            .check_in_with_snapshot(
                request.participant_id,
                request.resource_id,
                approver_id,
                notes.clone(),
                Some(request.id),
            )
            .await
        {
            Ok(checked_in) => checked_in,
            Err(e) => {
                self.ledger.release_for_rollback(request.resource_id).await;
                return Err(self.settled_or(request.id, e).await);
            }
        };

        let transition = RequestTransition {
            to: RequestStatus::Approved,
            processed_by: Some(approver_id.to_string()),
            processed_at: now,
            rejection_reason: None,
            notes,
            attendance_record_id: Some(record.id),
        };
        let outcome = self.store.transition_request(request.id, &transition).await;

        let error = match outcome {
            Ok(CasOutcome::Applied) => {
                tracing::info!(
                    request_id = request.id,
                    participant_id = request.participant_id,
                    resource_id = request.resource_id,
                    record_id = record.id,
                    approver_id,
                    "Check-in request approved"
                );
                return Ok(record);
            }
            Ok(_) => self.lost_race(request.id).await,
            Err(e) => e.into(),
        };

        self.recorder.revert_check_in(&record, &snapshot).await;
        self.ledger.release_for_rollback(request.resource_id).await;
        Err(error)
    }

    /// Reject a request. A blank reason is refused before anything is read.
    pub async fn reject(
        &self,
        token: &str,
        approver_id: &str,
        reason: &str,
    ) -> Result<CheckInRequest, CoreError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation(
                "a reason is required to reject a check-in request".into(),
            ));
        }

        let request = self.get_by_token(token).await?;
        let now = self.clock.now();
        self.ensure_pending(&request, now).await?;

        let transition = RequestTransition {
            to: RequestStatus::Rejected,
            processed_by: Some(approver_id.to_string()),
            processed_at: now,
            rejection_reason: Some(reason.to_string()),
            notes: None,
            attendance_record_id: None,
        };
        match self.store.transition_request(request.id, &transition).await? {
            CasOutcome::Applied => {
                tracing::info!(request_id = request.id, approver_id, reason, "Check-in request rejected");
                self.reload(request.id).await
            }
            _ => Err(self.lost_race(request.id).await),
        }
    }

    /// Withdraw a pending request. Only the guardian who created it may.
    pub async fn cancel(
        &self,
        request_id: DbId,
        requester_id: &str,
    ) -> Result<CheckInRequest, CoreError> {
        let request = self.reload(request_id).await?;
        if request.requester_id != requester_id {
            return Err(CoreError::Unauthorized(
                "only the guardian who created this request can cancel it".into(),
            ));
        }
        let now = self.clock.now();
        self.ensure_pending(&request, now).await?;

        let transition = RequestTransition {
            to: RequestStatus::Cancelled,
            processed_by: Some(requester_id.to_string()),
            processed_at: now,
            rejection_reason: None,
            notes: None,
            attendance_record_id: None,
        };
        match self.store.transition_request(request.id, &transition).await? {
            CasOutcome::Applied => {
                tracing::info!(request_id, requester_id, "Check-in request cancelled");
                self.reload(request_id).await
            }
            _ => Err(self.lost_race(request_id).await),
        }
    }

    /// Expire every pending request past its deadline. Returns how many this
    /// call moved; running it again right away returns 0.
    pub async fn sweep_expired(&self) -> Result<u64, CoreError> {
        let now = self.clock.now();
        let expired = self.store.expire_pending(now).await?;
        for request_id in &expired {
            tracing::info!(request_id, "Check-in request expired");
        }
        Ok(expired.len() as u64)
    }

    /// Staff queue for a resource, oldest first.
    pub async fn list_pending_for_resource(
        &self,
        resource_id: DbId,
    ) -> Result<Vec<CheckInRequest>, CoreError> {
        Ok(self
            .store
            .list_pending_for_resource(resource_id, self.clock.now())
            .await?)
    }

    pub async fn list_for_requester(
        &self,
        requester_id: &str,
    ) -> Result<Vec<CheckInRequest>, CoreError> {
        Ok(self.store.list_requests_for_requester(requester_id).await?)
    }

    /// Guard shared by approve/reject/cancel. A pending request past its
    /// deadline is expired on the spot.
    async fn ensure_pending(&self, request: &CheckInRequest, now: Timestamp) -> Result<(), CoreError> {
        match request.status {
            RequestStatus::Pending if now >= request.expires_at => {
                self.expire(request, now).await?;
                Err(CoreError::Expired)
            }
            RequestStatus::Pending => Ok(()),
            RequestStatus::Expired => Err(CoreError::Expired),
            status => Err(CoreError::AlreadyProcessed { status }),
        }
    }

    async fn expire(&self, request: &CheckInRequest, now: Timestamp) -> Result<(), CoreError> {
        let transition = RequestTransition {
            to: RequestStatus::Expired,
            processed_by: None,
            processed_at: now,
            rejection_reason: None,
            notes: None,
            attendance_record_id: None,
        };
        if self.store.transition_request(request.id, &transition).await? == CasOutcome::Applied {
            tracing::info!(request_id = request.id, "Check-in request expired");
        }
        Ok(())
    }

    /// Map the status that beat us to the error the loser reports.
    async fn lost_race(&self, request_id: DbId) -> CoreError {
        match self.store.find_request(request_id).await {
            Ok(Some(current)) if current.status == RequestStatus::Pending => {
                CoreError::Conflict("check-in request changed concurrently".into())
            }
            Ok(Some(current)) => settled_error(current.status),
            Ok(None) => CoreError::not_found("CheckInRequest", request_id),
            Err(e) => e.into(),
        }
    }

    /// A step of approve failed. If the request was settled meanwhile, the
    /// failure is a symptom of that (slot or child taken by the winner).
    async fn settled_or(&self, request_id: DbId, error: CoreError) -> CoreError {
        match self.store.find_request(request_id).await {
            Ok(Some(current)) if current.status != RequestStatus::Pending => {
                tracing::debug!(
                    request_id,
                    status = %current.status,
                    error = %error,
                    "Approve lost to a concurrent transition"
                );
                settled_error(current.status)
            }
            _ => error,
        }
    }

    async fn reload(&self, request_id: DbId) -> Result<CheckInRequest, CoreError> {
        self.store
            .find_request(request_id)
            .await?
            .ok_or_else(|| CoreError::not_found("CheckInRequest", request_id))
    }
}

fn settled_error(status: RequestStatus) -> CoreError {
    match status {
        RequestStatus::Expired => CoreError::Expired,
        status => CoreError::AlreadyProcessed { status },
    }
}
