//! Zero-sized repositories, one per table. Every method takes the pool
//! explicitly and returns raw `sqlx` results; [`crate::store::PgStore`]
//! maps them onto the core store traits.

pub mod attendance_repo;
pub mod check_in_request_repo;
pub mod participant_repo;
pub mod resource_repo;

pub use attendance_repo::AttendanceRepo;
pub use check_in_request_repo::CheckInRequestRepo;
pub use participant_repo::ParticipantRepo;
pub use resource_repo::ResourceRepo;
