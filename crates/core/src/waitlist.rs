//! Waitlist coordinator for events.
//!
//! Roster changes (join, leave + promotion, approval) are computed by the
//! pure `apply_*` functions on a loaded [`Resource`] and committed with a
//! single versioned `save_roster` write, so a leave and the promotion it
//! triggers land together or not at all. A version miss reloads and retries.
//!
//! Kids services never keep a waitlist; they reject at capacity instead.

use serde::Serialize;

use crate::error::CoreError;
use crate::models::Resource;
use crate::store::SharedStore;
use crate::types::DbId;

/// Result of [`WaitlistCoordinator::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Admitted,
    PendingApproval,
    Waitlisted,
    AlreadyAttending,
    AlreadyWaitlisted,
}

/// Result of [`WaitlistCoordinator::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveOutcome {
    /// An attendee left; `promoted` is the waitlist head that took the slot.
    Left { promoted: Option<DbId> },
    LeftWaitlist,
    NotAssociated,
}

/// Result of [`WaitlistCoordinator::approve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub participant_id: DbId,
    pub remaining: i32,
}

// ---------------------------------------------------------------------------
// Roster rules
// ---------------------------------------------------------------------------

/// Admit, queue, or report the existing state of `participant_id`.
pub fn apply_join(resource: &mut Resource, participant_id: DbId) -> Result<JoinOutcome, CoreError> {
    if resource.attendees.contains(&participant_id) {
        return Ok(JoinOutcome::AlreadyAttending);
    }
    if resource.waitlist.contains(&participant_id) {
        return Ok(JoinOutcome::AlreadyWaitlisted);
    }
    if !resource.accepting_check_ins {
        return Err(CoreError::ServiceNotAccepting);
    }
    if resource.requires_approval {
        resource.waitlist.push(participant_id);
        return Ok(JoinOutcome::PendingApproval);
    }
    if resource.is_full() {
        resource.waitlist.push(participant_id);
        return Ok(JoinOutcome::Waitlisted);
    }
    admit(resource, participant_id);
    Ok(JoinOutcome::Admitted)
}

/// Remove `participant_id` from the attendees or the waitlist. An attendee
/// leaving frees a slot that goes to the waitlist head.
pub fn apply_leave(resource: &mut Resource, participant_id: DbId) -> LeaveOutcome {
    if let Some(pos) = resource.attendees.iter().position(|&id| id == participant_id) {
        resource.attendees.remove(pos);
        if resource.occupied > 0 {
            resource.occupied -= 1;
        } else {
            tracing::error!(
                resource_id = resource.id,
                participant_id,
                "Attendee left with nothing reserved; occupancy bookkeeping is out of sync"
            );
        }
        let promoted = apply_promote(resource);
        return LeaveOutcome::Left { promoted };
    }
    if let Some(pos) = resource.waitlist.iter().position(|&id| id == participant_id) {
        resource.waitlist.remove(pos);
        return LeaveOutcome::LeftWaitlist;
    }
    LeaveOutcome::NotAssociated
}

/// Move a waitlisted participant into the attendees.
pub fn apply_approve(resource: &mut Resource, participant_id: DbId) -> Result<(), CoreError> {
    let Some(pos) = resource.waitlist.iter().position(|&id| id == participant_id) else {
        return Err(CoreError::NotWaitlisted);
    };
    if resource.is_full() {
        return Err(CoreError::AtCapacity);
    }
    resource.waitlist.remove(pos);
    admit(resource, participant_id);
    Ok(())
}

/// Promote the waitlist head if a slot is free.
///
/// Approval-gated events are drained only by [`apply_approve`]; their queue
/// is never promoted automatically. Nobody is admitted while the resource is
/// closed to check-ins.
pub fn apply_promote(resource: &mut Resource) -> Option<DbId> {
    if resource.requires_approval
        || !resource.accepting_check_ins
        || resource.is_full()
        || resource.waitlist.is_empty()
    {
        return None;
    }
    let next = resource.waitlist.remove(0);
    admit(resource, next);
    Some(next)
}

fn admit(resource: &mut Resource, participant_id: DbId) {
    resource.attendees.push(participant_id);
    resource.occupied += 1;
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WaitlistCoordinator {
    store: SharedStore,
    max_attempts: u32,
}

impl WaitlistCoordinator {
    pub fn new(store: SharedStore, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn join(
        &self,
        resource_id: DbId,
        participant_id: DbId,
    ) -> Result<JoinOutcome, CoreError> {
        let outcome = self
            .update_roster(resource_id, |r| apply_join(r, participant_id))
            .await?;
        tracing::info!(resource_id, participant_id, ?outcome, "Event join");
        Ok(outcome)
    }

    pub async fn leave(
        &self,
        resource_id: DbId,
        participant_id: DbId,
    ) -> Result<LeaveOutcome, CoreError> {
        let outcome = self
            .update_roster(resource_id, |r| Ok(apply_leave(r, participant_id)))
            .await?;
        tracing::info!(resource_id, participant_id, ?outcome, "Event leave");
        Ok(outcome)
    }

    pub async fn approve(
        &self,
        resource_id: DbId,
        participant_id: DbId,
        approver_id: &str,
    ) -> Result<ApprovalOutcome, CoreError> {
        let remaining = self
            .update_roster(resource_id, |r| {
                apply_approve(r, participant_id)?;
                Ok(r.remaining())
            })
            .await?;
        tracing::info!(resource_id, participant_id, approver_id, "Waitlist entry approved");
        Ok(ApprovalOutcome {
            participant_id,
            remaining,
        })
    }

    /// Fill a freed slot from the head of the queue, if any.
    pub async fn promote_next(&self, resource_id: DbId) -> Result<Option<DbId>, CoreError> {
        self.update_roster(resource_id, |r| Ok(apply_promote(r)))
            .await
    }

    /// Load, mutate, and conditionally save an event roster.
    async fn update_roster<T, F>(&self, resource_id: DbId, mut change: F) -> Result<T, CoreError>
    where
        F: FnMut(&mut Resource) -> Result<T, CoreError> + Send,
        T: Send,
    {
        for attempt in 1..=self.max_attempts {
            let original = self
                .store
                .find_resource(resource_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Resource", resource_id))?;
            if !original.kind.supports_waitlist() {
                return Err(CoreError::Validation(format!(
                    "'{}' does not keep a waitlist",
                    original.name
                )));
            }

            let mut updated = original.clone();
            let outcome = change(&mut updated)?;
            if updated == original {
                return Ok(outcome);
            }
            if self.store.save_roster(&updated).await? {
                return Ok(outcome);
            }
            tracing::debug!(resource_id, attempt, "Roster version conflict, retrying");
        }
        Err(CoreError::Conflict(format!(
            "roster for resource {resource_id} kept changing; try again"
        )))
    }
}
