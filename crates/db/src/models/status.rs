//! Status enums mapping to the SMALLSERIAL lookup tables.
//!
//! Each variant's discriminant matches the seed order (1-based) of the
//! corresponding `*_statuses` table.

use covenant_core::status as domain;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident => $domain:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( x if x == $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl From<$domain> for $name {
            fn from(value: $domain) -> Self {
                match value {
                    $( <$domain>::$variant => Self::$variant, )+
                }
            }
        }

        impl From<$name> for $domain {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => <$domain>::$variant, )+
                }
            }
        }
    };
}

define_status_enum! {
    /// Participant presence status.
    ParticipantStatus => domain::ParticipantStatus {
        NotInService = 1,
        CheckedIn = 2,
        CheckedOut = 3,
    }
}

define_status_enum! {
    /// Check-in request lifecycle status.
    CheckInRequestStatus => domain::RequestStatus {
        Pending = 1,
        Approved = 2,
        Rejected = 3,
        Expired = 4,
        Cancelled = 5,
    }
}

define_status_enum! {
    /// Attendance record status.
    AttendanceStatus => domain::AttendanceStatus {
        CheckedIn = 1,
        CheckedOut = 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for id in 1..=5 {
            let status = CheckInRequestStatus::from_id(id).unwrap();
            assert_eq!(status.id(), id);
        }
        assert_eq!(CheckInRequestStatus::from_id(6), None);
    }

    #[test]
    fn converts_to_and_from_domain() {
        let db: CheckInRequestStatus = domain::RequestStatus::Expired.into();
        assert_eq!(db, CheckInRequestStatus::Expired);
        assert_eq!(db.id(), 4);
        assert_eq!(
            domain::ParticipantStatus::from(ParticipantStatus::CheckedIn),
            domain::ParticipantStatus::CheckedIn
        );
    }
}
