//! Row model for the `resources` table.

use covenant_core::error::StoreError;
use covenant_core::models::{Resource, ResourceKind};
use covenant_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `resources` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResourceRow {
    pub id: DbId,
    pub kind: String,
    pub name: String,
    pub capacity: i32,
    pub occupied: i32,
    pub accepting_check_ins: bool,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub requires_approval: bool,
    pub attendees: Vec<DbId>,
    pub waitlist: Vec<DbId>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ResourceRow {
    pub fn into_domain(self) -> Result<Resource, StoreError> {
        let kind = ResourceKind::from_name(&self.kind).ok_or_else(|| {
            StoreError::Backend(format!("unknown resource kind '{}'", self.kind))
        })?;
        Ok(Resource {
            id: self.id,
            kind,
            name: self.name,
            capacity: self.capacity,
            occupied: self.occupied,
            accepting_check_ins: self.accepting_check_ins,
            age_min: self.age_min,
            age_max: self.age_max,
            requires_approval: self.requires_approval,
            attendees: self.attendees,
            waitlist: self.waitlist,
            version: self.version,
        })
    }
}
