//! Capacity ledger: atomic reserve/release of resource occupancy.
//!
//! Serialization happens in the store (`try_reserve`/`try_release` are
//! conditional updates scoped to one resource), so two callers racing for
//! the last slot get exactly one `Reserved` between them. Releasing a slot on
//! an event with a waitlist hands the slot to the head of the queue.

use chrono::NaiveDate;

use crate::error::CoreError;
use crate::models::{Availability, Participant, Resource};
use crate::store::{ReleaseOutcome, ReserveOutcome, SharedStore};
use crate::types::DbId;
use crate::waitlist::WaitlistCoordinator;

#[derive(Clone)]
pub struct CapacityLedger {
    store: SharedStore,
    waitlist: WaitlistCoordinator,
}

impl CapacityLedger {
    pub fn new(store: SharedStore, waitlist: WaitlistCoordinator) -> Self {
        Self { store, waitlist }
    }

    /// Take one slot on `resource_id`.
    pub async fn reserve(&self, resource_id: DbId) -> Result<(), CoreError> {
        match self.store.try_reserve(resource_id).await? {
            ReserveOutcome::Reserved { occupied } => {
                tracing::debug!(resource_id, occupied, "Capacity reserved");
                Ok(())
            }
            ReserveOutcome::AtCapacity => Err(CoreError::AtCapacity),
            ReserveOutcome::NotAccepting => Err(CoreError::ServiceNotAccepting),
            ReserveOutcome::NotFound => Err(CoreError::not_found("Resource", resource_id)),
        }
    }

    /// Give back one slot on `resource_id`.
    ///
    /// On an event with a non-empty waitlist the freed slot is offered to the
    /// waitlist head. A failed promotion is logged; the release itself stands.
    pub async fn release(&self, resource_id: DbId) -> Result<(), CoreError> {
        match self.store.try_release(resource_id).await? {
            ReleaseOutcome::Released { occupied } => {
                tracing::debug!(resource_id, occupied, "Capacity released");
            }
            ReleaseOutcome::Underflow => {
                tracing::error!(
                    resource_id,
                    "Capacity release with nothing reserved; occupancy bookkeeping is out of sync"
                );
                return Err(CoreError::Underflow { resource_id });
            }
            ReleaseOutcome::NotFound => {
                return Err(CoreError::not_found("Resource", resource_id));
            }
        }

        let Some(resource) = self.store.find_resource(resource_id).await? else {
            return Ok(());
        };
        if resource.kind.supports_waitlist() && !resource.waitlist.is_empty() {
            match self.waitlist.promote_next(resource_id).await {
                Ok(Some(participant_id)) => {
                    tracing::info!(resource_id, participant_id, "Promoted from waitlist");
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(resource_id, error = %e, "Waitlist promotion failed");
                }
            }
        }
        Ok(())
    }

    /// Current occupancy snapshot.
    pub async fn availability(&self, resource_id: DbId) -> Result<Availability, CoreError> {
        self.store
            .find_resource(resource_id)
            .await?
            .map(|r| r.availability())
            .ok_or_else(|| CoreError::not_found("Resource", resource_id))
    }

    /// Release used while unwinding a failed multi-step operation.
    pub(crate) async fn release_for_rollback(&self, resource_id: DbId) {
        if let Err(e) = self.release(resource_id).await {
            tracing::error!(resource_id, error = %e, "Failed to release capacity during rollback");
        }
    }
}

/// `age_min <= age <= age_max`, with missing bounds left open.
pub fn is_eligible(age: i32, resource: &Resource) -> bool {
    resource.age_min.map_or(true, |min| age >= min)
        && resource.age_max.map_or(true, |max| age <= max)
}

/// Check a participant against a resource's age band on `today`.
pub fn check_eligibility(
    participant: &Participant,
    resource: &Resource,
    today: NaiveDate,
) -> Result<(), CoreError> {
    if resource.age_min.is_none() && resource.age_max.is_none() {
        return Ok(());
    }
    let age = participant.age_on(today).ok_or_else(|| {
        CoreError::Validation(format!(
            "a birth date is required to check in to '{}'",
            resource.name
        ))
    })?;
    if is_eligible(age, resource) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "child's age ({age}) is outside the age range for '{}'",
            resource.name
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use futures::future::join_all;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{NewResource, ResourceKind};
    use crate::status::ParticipantStatus;
    use crate::store::ResourceStore;

    fn kids_service(capacity: i32) -> NewResource {
        NewResource {
            kind: ResourceKind::KidsService,
            name: "Toddlers".into(),
            capacity,
            accepting_check_ins: true,
            age_min: Some(2),
            age_max: Some(4),
            requires_approval: false,
        }
    }

    fn ledger(store: &Arc<MemoryStore>) -> CapacityLedger {
        let shared: SharedStore = store.clone();
        CapacityLedger::new(shared.clone(), WaitlistCoordinator::new(shared, 5))
    }

    #[tokio::test]
    async fn reserve_then_full_then_release() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.insert_resource(&kids_service(1)).await.unwrap();
        let ledger = ledger(&store);

        ledger.reserve(resource.id).await.unwrap();
        assert_eq!(ledger.availability(resource.id).await.unwrap().occupied, 1);

        assert_matches!(ledger.reserve(resource.id).await, Err(CoreError::AtCapacity));

        ledger.release(resource.id).await.unwrap();
        assert_eq!(ledger.availability(resource.id).await.unwrap().occupied, 0);
    }

    #[tokio::test]
    async fn reserve_fails_when_not_accepting() {
        let store = Arc::new(MemoryStore::new());
        let resource = store
            .insert_resource(&NewResource {
                accepting_check_ins: false,
                ..kids_service(10)
            })
            .await
            .unwrap();

        assert_matches!(
            ledger(&store).reserve(resource.id).await,
            Err(CoreError::ServiceNotAccepting)
        );
    }

    #[tokio::test]
    async fn release_at_zero_is_underflow() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.insert_resource(&kids_service(3)).await.unwrap();

        assert_matches!(
            ledger(&store).release(resource.id).await,
            Err(CoreError::Underflow { resource_id }) if resource_id == resource.id
        );
    }

    #[tokio::test]
    async fn unknown_resource_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        assert_matches!(
            ledger(&store).reserve(404).await,
            Err(CoreError::NotFound { entity: "Resource", .. })
        );
    }

    #[tokio::test]
    async fn concurrent_reserves_for_last_slot_yield_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.insert_resource(&kids_service(5)).await.unwrap();
        let ledger = ledger(&store);
        for _ in 0..4 {
            ledger.reserve(resource.id).await.unwrap();
        }

        let attempts = (0..16).map(|_| {
            let ledger = ledger.clone();
            let id = resource.id;
            tokio::spawn(async move { ledger.reserve(id).await })
        });
        let results: Vec<_> = join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(CoreError::AtCapacity))));
        assert_eq!(ledger.availability(resource.id).await.unwrap().occupied, 5);
    }

    #[tokio::test]
    async fn occupancy_stays_in_bounds_under_mixed_load() {
        let store = Arc::new(MemoryStore::new());
        let resource = store.insert_resource(&kids_service(3)).await.unwrap();
        let ledger = ledger(&store);

        let tasks = (0..40).map(|i| {
            let ledger = ledger.clone();
            let id = resource.id;
            tokio::spawn(async move {
                if i % 2 == 0 {
                    let _ = ledger.reserve(id).await;
                } else {
                    let _ = ledger.release(id).await;
                }
                ledger.availability(id).await.unwrap()
            })
        });

        for snapshot in join_all(tasks).await {
            let snapshot = snapshot.unwrap();
            assert!(snapshot.occupied >= 0 && snapshot.occupied <= snapshot.capacity);
        }
    }

    #[test]
    fn eligibility_band_is_inclusive() {
        let resource = Resource {
            id: 1,
            kind: ResourceKind::KidsService,
            name: "Preschool".into(),
            capacity: 10,
            occupied: 0,
            accepting_check_ins: true,
            age_min: Some(3),
            age_max: Some(5),
            requires_approval: false,
            attendees: vec![],
            waitlist: vec![],
            version: 0,
        };
        assert!(!is_eligible(2, &resource));
        assert!(is_eligible(3, &resource));
        assert!(is_eligible(5, &resource));
        assert!(!is_eligible(6, &resource));

        let open = Resource {
            age_min: None,
            age_max: None,
            ..resource
        };
        assert!(is_eligible(42, &open));
    }

    #[test]
    fn missing_birth_date_fails_banded_resource() {
        let resource = Resource {
            id: 1,
            kind: ResourceKind::KidsService,
            name: "Preschool".into(),
            capacity: 10,
            occupied: 0,
            accepting_check_ins: true,
            age_min: Some(3),
            age_max: None,
            requires_approval: false,
            attendees: vec![],
            waitlist: vec![],
            version: 0,
        };
        let child = Participant {
            id: 7,
            guardian_id: "g".into(),
            first_name: "Sam".into(),
            last_name: "Lee".into(),
            birth_date: None,
            status: ParticipantStatus::NotInService,
            current_resource_id: None,
            last_check_in: None,
            last_check_out: None,
        };
        let today = NaiveDate::from_ymd_opt(2026, 10, 4).unwrap();
        assert_matches!(
            check_eligibility(&child, &resource, today),
            Err(CoreError::Validation(msg)) if msg.contains("birth date")
        );
    }
}
