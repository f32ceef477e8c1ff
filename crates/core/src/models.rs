//! Domain entities of the check-in subsystem and the DTOs used to create them.
//!
//! Resources hold participant ids only (attendees and waitlist as ordered
//! sequences), never live references; every occupancy or roster mutation
//! goes through the capacity ledger or the waitlist coordinator.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::status::{AttendanceStatus, ParticipantStatus, RequestStatus};
use crate::types::{ActorId, DbId, Timestamp};

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// The two capacity policies a resource can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Rejects at capacity; never keeps a waitlist.
    KidsService,
    /// Queues participants at capacity and promotes them as slots free up.
    Event,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KidsService => "kids_service",
            Self::Event => "event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "kids_service" => Some(Self::KidsService),
            "event" => Some(Self::Event),
            _ => None,
        }
    }

    pub fn supports_waitlist(self) -> bool {
        matches!(self, Self::Event)
    }
}

/// A capacity-bounded session (kids service or event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: DbId,
    pub kind: ResourceKind,
    pub name: String,
    pub capacity: i32,
    pub occupied: i32,
    pub accepting_check_ins: bool,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub requires_approval: bool,
    /// Admitted event attendees, in admission order.
    pub attendees: Vec<DbId>,
    /// FIFO queue of participants waiting for a slot or for approval.
    pub waitlist: Vec<DbId>,
    /// Bumped by every occupancy or roster write.
    pub version: i64,
}

impl Resource {
    pub fn remaining(&self) -> i32 {
        (self.capacity - self.occupied).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.occupied >= self.capacity
    }

    pub fn availability(&self) -> Availability {
        Availability {
            resource_id: self.id,
            capacity: self.capacity,
            occupied: self.occupied,
            remaining: self.remaining(),
            accepting: self.accepting_check_ins,
        }
    }
}

/// Point-in-time occupancy snapshot of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub resource_id: DbId,
    pub capacity: i32,
    pub occupied: i32,
    pub remaining: i32,
    pub accepting: bool,
}

/// DTO for creating a resource.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewResource {
    pub kind: ResourceKind,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1))]
    pub capacity: i32,
    pub accepting_check_ins: bool,
    #[validate(range(min = 0))]
    pub age_min: Option<i32>,
    #[validate(range(min = 0))]
    pub age_max: Option<i32>,
    pub requires_approval: bool,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A child (or event attendee) whose presence is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: DbId,
    pub guardian_id: ActorId,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub status: ParticipantStatus,
    /// Set iff `status` is `CheckedIn`.
    pub current_resource_id: Option<DbId>,
    pub last_check_in: Option<Timestamp>,
    pub last_check_out: Option<Timestamp>,
}

impl Participant {
    /// Age in whole years on the given date, if a birth date is known.
    pub fn age_on(&self, on: NaiveDate) -> Option<i32> {
        let born = self.birth_date?;
        let mut age = on.year() - born.year();
        if (on.month(), on.day()) < (born.month(), born.day()) {
            age -= 1;
        }
        Some(age.max(0))
    }

    pub fn is_checked_in(&self) -> bool {
        self.status == ParticipantStatus::CheckedIn
    }
}

/// DTO for registering a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewParticipant {
    #[validate(length(min = 1))]
    pub guardian_id: ActorId,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// CheckInRequest
// ---------------------------------------------------------------------------

/// A token-bound, time-limited request awaiting staff approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub id: DbId,
    pub participant_id: DbId,
    pub resource_id: DbId,
    pub requester_id: ActorId,
    /// QR-code payload. Unique and single-use.
    pub token: String,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub processed_by: Option<ActorId>,
    pub processed_at: Option<Timestamp>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub attendance_record_id: Option<DbId>,
}

impl CheckInRequest {
    /// `true` while the request is pending and not yet past its expiry.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.status == RequestStatus::Pending && now < self.expires_at
    }
}

/// Insert DTO for a check-in request; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewCheckInRequest {
    pub participant_id: DbId,
    pub resource_id: DbId,
    pub requester_id: ActorId,
    pub token: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub notes: Option<String>,
}

/// The terminal values written by a PENDING -> terminal compare-and-set.
#[derive(Debug, Clone)]
pub struct RequestTransition {
    pub to: RequestStatus,
    pub processed_by: Option<ActorId>,
    pub processed_at: Timestamp,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub attendance_record_id: Option<DbId>,
}

// ---------------------------------------------------------------------------
// AttendanceRecord
// ---------------------------------------------------------------------------

/// One stay of a participant at a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: DbId,
    pub participant_id: DbId,
    pub resource_id: DbId,
    pub check_in_time: Timestamp,
    pub check_out_time: Option<Timestamp>,
    pub checked_in_by: ActorId,
    pub checked_out_by: Option<ActorId>,
    pub status: AttendanceStatus,
    pub check_in_request_id: Option<DbId>,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    /// Whole minutes between check-in and check-out; `None` while checked in.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.check_out_time
            .map(|out| (out - self.check_in_time).num_minutes())
    }
}

/// Insert DTO for an attendance record.
#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub participant_id: DbId,
    pub resource_id: DbId,
    pub check_in_time: Timestamp,
    pub checked_in_by: ActorId,
    pub check_in_request_id: Option<DbId>,
    pub notes: Option<String>,
}
