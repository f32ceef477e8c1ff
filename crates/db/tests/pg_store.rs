//! `PgStore` against a real database: conditional writes, unique
//! constraints, and the check-in services end to end.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use covenant_core::clock::ManualClock;
use covenant_core::config::CheckInPolicy;
use covenant_core::error::{CoreError, StoreError};
use covenant_core::models::{
    NewAttendanceRecord, NewCheckInRequest, NewParticipant, NewResource, ResourceKind,
};
use covenant_core::service::CheckInServices;
use covenant_core::status::{ParticipantStatus, RequestStatus};
use covenant_core::store::{
    AttendanceStore, ParticipantStore, ReleaseOutcome, RequestStore, ReserveOutcome,
    ResourceStore, SharedStore,
};
use covenant_core::waitlist::{JoinOutcome, LeaveOutcome};
use covenant_db::PgStore;
use sqlx::PgPool;

fn kids_service(capacity: i32) -> NewResource {
    NewResource {
        kind: ResourceKind::KidsService,
        name: "Preschool".into(),
        capacity,
        accepting_check_ins: true,
        age_min: None,
        age_max: None,
        requires_approval: false,
    }
}

fn child(first_name: &str) -> NewParticipant {
    NewParticipant {
        guardian_id: "guardian-1".into(),
        first_name: first_name.into(),
        last_name: "Okafor".into(),
        birth_date: NaiveDate::from_ymd_opt(2021, 2, 14),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reserve_and_release_respect_bounds(pool: PgPool) {
    let store = PgStore::new(pool);
    let resource = store.insert_resource(&kids_service(1)).await.unwrap();

    assert_eq!(
        store.try_reserve(resource.id).await.unwrap(),
        ReserveOutcome::Reserved { occupied: 1 }
    );
    assert_eq!(store.try_reserve(resource.id).await.unwrap(), ReserveOutcome::AtCapacity);
    assert_eq!(
        store.try_release(resource.id).await.unwrap(),
        ReleaseOutcome::Released { occupied: 0 }
    );
    assert_eq!(store.try_release(resource.id).await.unwrap(), ReleaseOutcome::Underflow);
    assert_eq!(store.try_reserve(9_999).await.unwrap(), ReserveOutcome::NotFound);

    store.set_accepting(resource.id, false).await.unwrap();
    assert_eq!(store.try_reserve(resource.id).await.unwrap(), ReserveOutcome::NotAccepting);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_reserves_for_last_slot(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let resource = store.insert_resource(&kids_service(3)).await.unwrap();
    store.try_reserve(resource.id).await.unwrap();
    store.try_reserve(resource.id).await.unwrap();

    let attempts = (0..10).map(|_| {
        let store = Arc::clone(&store);
        let id = resource.id;
        tokio::spawn(async move { store.try_reserve(id).await.unwrap() })
    });
    let outcomes: Vec<ReserveOutcome> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, ReserveOutcome::Reserved { .. }))
        .count();
    assert_eq!(winners, 1);
    let stored = store.find_resource(resource.id).await.unwrap().unwrap();
    assert_eq!(stored.occupied, 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn roster_write_is_version_checked(pool: PgPool) {
    let store = PgStore::new(pool);
    let event = store
        .insert_resource(&NewResource {
            kind: ResourceKind::Event,
            ..kids_service(2)
        })
        .await
        .unwrap();

    let mut first = event.clone();
    first.attendees.push(1);
    first.occupied = 1;
    assert!(store.save_roster(&first).await.unwrap());

    let mut stale = event.clone();
    stale.waitlist.push(2);
    assert!(!store.save_roster(&stale).await.unwrap());

    let stored = store.find_resource(event.id).await.unwrap().unwrap();
    assert_eq!(stored.attendees, vec![1]);
    assert!(stored.waitlist.is_empty());
    assert_eq!(stored.version, event.version + 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_token_is_a_conflict(pool: PgPool) {
    let store = PgStore::new(pool);
    let resource = store.insert_resource(&kids_service(5)).await.unwrap();
    let a = store.insert_participant(&child("Ada")).await.unwrap();
    let b = store.insert_participant(&child("Bo")).await.unwrap();
    let now = Utc::now();

    let request = |participant_id| NewCheckInRequest {
        participant_id,
        resource_id: resource.id,
        requester_id: "guardian-1".into(),
        token: "f".repeat(64),
        created_at: now,
        expires_at: now + Duration::minutes(15),
        notes: None,
    };
    store.insert_request(&request(a.id)).await.unwrap();
    assert_matches!(
        store.insert_request(&request(b.id)).await,
        Err(StoreError::Conflict(msg)) if msg.contains("uq_check_in_requests_token")
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_open_attendance_is_a_conflict(pool: PgPool) {
    let store = PgStore::new(pool);
    let resource = store.insert_resource(&kids_service(5)).await.unwrap();
    let p = store.insert_participant(&child("Ada")).await.unwrap();
    let input = NewAttendanceRecord {
        participant_id: p.id,
        resource_id: resource.id,
        check_in_time: Utc::now(),
        checked_in_by: "staff-1".into(),
        check_in_request_id: None,
        notes: None,
    };

    store.insert_attendance(&input).await.unwrap();
    assert_matches!(
        store.insert_attendance(&input).await,
        Err(StoreError::Conflict(_))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn request_flow_end_to_end(pool: PgPool) {
    let pg = Arc::new(PgStore::new(pool));
    let store: SharedStore = pg.clone();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 4, 9, 0, 0).unwrap(),
    ));
    let services = CheckInServices::new(store, clock.clone(), CheckInPolicy::default());

    let resource = pg.insert_resource(&kids_service(1)).await.unwrap();
    let a = pg.insert_participant(&child("Ada")).await.unwrap();
    let b = pg.insert_participant(&child("Bo")).await.unwrap();

    let first = services.requests.create(a.id, resource.id, "guardian-1", None).await.unwrap();
    let second = services.requests.create(b.id, resource.id, "guardian-1", None).await.unwrap();

    let record = services
        .requests
        .approve(&first.token, "staff-1", None)
        .await
        .unwrap();
    assert_eq!(record.check_in_request_id, Some(first.id));
    assert_matches!(
        services.requests.approve(&second.token, "staff-1", None).await,
        Err(CoreError::AtCapacity)
    );
    assert_eq!(
        pg.find_request(second.id).await.unwrap().unwrap().status,
        RequestStatus::Pending
    );

    clock.advance(Duration::minutes(45));
    let closed = services
        .attendance
        .record_check_out(a.id, "staff-1", None)
        .await
        .unwrap();
    assert_eq!(closed.duration_minutes(), Some(45));
    assert_eq!(
        pg.find_participant(a.id).await.unwrap().unwrap().status,
        ParticipantStatus::CheckedOut
    );
    assert_eq!(services.ledger.availability(resource.id).await.unwrap().occupied, 0);

    // The second request was created at 09:00 and is long past its deadline.
    assert_matches!(
        services.requests.approve(&second.token, "staff-1", None).await,
        Err(CoreError::Expired)
    );
    assert_eq!(services.requests.sweep_expired().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn sweep_expires_each_request_once(pool: PgPool) {
    let pg = Arc::new(PgStore::new(pool));
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 10, 4, 9, 0, 0).unwrap(),
    ));
    let services = CheckInServices::new(pg.clone(), clock.clone(), CheckInPolicy::default());
    let resource = pg.insert_resource(&kids_service(10)).await.unwrap();
    for name in ["Ada", "Bo"] {
        let p = pg.insert_participant(&child(name)).await.unwrap();
        services.requests.create(p.id, resource.id, "guardian-1", None).await.unwrap();
    }

    clock.advance(Duration::minutes(16));
    assert_eq!(services.requests.sweep_expired().await.unwrap(), 2);
    assert_eq!(services.requests.sweep_expired().await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn event_waitlist_promotes_on_leave(pool: PgPool) {
    let pg = Arc::new(PgStore::new(pool));
    let services = CheckInServices::new(
        pg.clone(),
        Arc::new(ManualClock::default()),
        CheckInPolicy::default(),
    );
    let event = pg
        .insert_resource(&NewResource {
            kind: ResourceKind::Event,
            ..kids_service(1)
        })
        .await
        .unwrap();

    assert_eq!(services.waitlist.join(event.id, 10).await.unwrap(), JoinOutcome::Admitted);
    assert_eq!(services.waitlist.join(event.id, 11).await.unwrap(), JoinOutcome::Waitlisted);
    assert_eq!(
        services.waitlist.leave(event.id, 10).await.unwrap(),
        LeaveOutcome::Left { promoted: Some(11) }
    );

    let stored = pg.find_resource(event.id).await.unwrap().unwrap();
    assert_eq!(stored.attendees, vec![11]);
    assert_eq!(stored.occupied, 1);
}
