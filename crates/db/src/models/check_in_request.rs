//! Row model for the `check_in_requests` table.

use covenant_core::error::StoreError;
use covenant_core::models::CheckInRequest;
use covenant_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{CheckInRequestStatus, StatusId};

/// A row from the `check_in_requests` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CheckInRequestRow {
    pub id: DbId,
    pub participant_id: DbId,
    pub resource_id: DbId,
    pub requester_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub processed_by: Option<String>,
    pub processed_at: Option<Timestamp>,
    pub rejection_reason: Option<String>,
    pub notes: Option<String>,
    pub attendance_record_id: Option<DbId>,
}

impl CheckInRequestRow {
    pub fn into_domain(self) -> Result<CheckInRequest, StoreError> {
        let status = CheckInRequestStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!("unknown check-in request status id {}", self.status_id))
        })?;
        Ok(CheckInRequest {
            id: self.id,
            participant_id: self.participant_id,
            resource_id: self.resource_id,
            requester_id: self.requester_id,
            token: self.token,
            status: status.into(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            processed_by: self.processed_by,
            processed_at: self.processed_at,
            rejection_reason: self.rejection_reason,
            notes: self.notes,
            attendance_record_id: self.attendance_record_id,
        })
    }
}
