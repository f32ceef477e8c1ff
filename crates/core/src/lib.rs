//! Domain core of the child check-in subsystem.
//!
//! Holds the entities, error kinds, and the store seams, plus the four
//! components that enforce the check-in rules: [`capacity::CapacityLedger`],
//! [`checkin_request::CheckInRequestService`],
//! [`attendance::AttendanceRecorder`] and [`waitlist::WaitlistCoordinator`].
//! [`service::CheckInServices`] wires them together.

pub mod attendance;
pub mod capacity;
pub mod checkin_request;
pub mod clock;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod service;
pub mod status;
pub mod store;
pub mod token;
pub mod types;
pub mod waitlist;
