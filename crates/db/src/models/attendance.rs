//! Row model for the `attendance_records` table.

use covenant_core::error::StoreError;
use covenant_core::models::AttendanceRecord;
use covenant_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{AttendanceStatus, StatusId};

/// A row from the `attendance_records` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttendanceRow {
    pub id: DbId,
    pub participant_id: DbId,
    pub resource_id: DbId,
    pub check_in_time: Timestamp,
    pub check_out_time: Option<Timestamp>,
    pub checked_in_by: String,
    pub checked_out_by: Option<String>,
    pub status_id: StatusId,
    pub check_in_request_id: Option<DbId>,
    pub notes: Option<String>,
}

impl AttendanceRow {
    pub fn into_domain(self) -> Result<AttendanceRecord, StoreError> {
        let status = AttendanceStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!("unknown attendance status id {}", self.status_id))
        })?;
        Ok(AttendanceRecord {
            id: self.id,
            participant_id: self.participant_id,
            resource_id: self.resource_id,
            check_in_time: self.check_in_time,
            check_out_time: self.check_out_time,
            checked_in_by: self.checked_in_by,
            checked_out_by: self.checked_out_by,
            status: status.into(),
            check_in_request_id: self.check_in_request_id,
            notes: self.notes,
        })
    }
}
