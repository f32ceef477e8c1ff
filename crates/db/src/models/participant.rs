//! Row model for the `participants` table.

use chrono::NaiveDate;
use covenant_core::error::StoreError;
use covenant_core::models::Participant;
use covenant_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{ParticipantStatus, StatusId};

/// A row from the `participants` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ParticipantRow {
    pub id: DbId,
    pub guardian_id: String,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub status_id: StatusId,
    pub current_resource_id: Option<DbId>,
    pub last_check_in: Option<Timestamp>,
    pub last_check_out: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ParticipantRow {
    pub fn into_domain(self) -> Result<Participant, StoreError> {
        let status = ParticipantStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Backend(format!("unknown participant status id {}", self.status_id))
        })?;
        Ok(Participant {
            id: self.id,
            guardian_id: self.guardian_id,
            first_name: self.first_name,
            last_name: self.last_name,
            birth_date: self.birth_date,
            status: status.into(),
            current_resource_id: self.current_resource_id,
            last_check_in: self.last_check_in,
            last_check_out: self.last_check_out,
        })
    }
}
