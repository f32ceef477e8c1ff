//! Repository for the `resources` table.

use covenant_core::models::{NewResource, Resource};
use covenant_core::types::DbId;
use sqlx::PgPool;

use crate::models::resource::ResourceRow;

/// Column list for resources queries.
const COLUMNS: &str = "id, kind, name, capacity, occupied, accepting_check_ins, \
    age_min, age_max, requires_approval, attendees, waitlist, version, created_at, updated_at";

/// Occupancy and roster operations for resources.
pub struct ResourceRepo;

impl ResourceRepo {
    /// Insert a new resource, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewResource) -> Result<ResourceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO resources
                (kind, name, capacity, accepting_check_ins, age_min, age_max, requires_approval)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ResourceRow>(&query)
            .bind(input.kind.as_str())
            .bind(&input.name)
            .bind(input.capacity)
            .bind(input.accepting_check_ins)
            .bind(input.age_min)
            .bind(input.age_max)
            .bind(input.requires_approval)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ResourceRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resources WHERE id = $1");
        sqlx::query_as::<_, ResourceRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Take one slot if there is room and the resource is accepting.
    ///
    /// Returns the new occupancy, or `None` if the guard failed (or the row
    /// does not exist). The row lock taken by the UPDATE serializes racing
    /// callers.
    pub async fn try_reserve(pool: &PgPool, id: DbId) -> Result<Option<i32>, sqlx::Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE resources
             SET occupied = occupied + 1, version = version + 1, updated_at = NOW()
             WHERE id = $1 AND accepting_check_ins AND occupied < capacity
             RETURNING occupied",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(occupied,)| occupied))
    }

    /// Give back one slot if any is held. `None` means underflow or missing.
    pub async fn try_release(pool: &PgPool, id: DbId) -> Result<Option<i32>, sqlx::Error> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE resources
             SET occupied = occupied - 1, version = version + 1, updated_at = NOW()
             WHERE id = $1 AND occupied > 0
             RETURNING occupied",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(occupied,)| occupied))
    }

    /// Write occupancy and roster iff the stored version is unchanged.
    pub async fn save_roster(pool: &PgPool, resource: &Resource) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resources
             SET occupied = $2, attendees = $3, waitlist = $4,
                 version = version + 1, updated_at = NOW()
             WHERE id = $1 AND version = $5",
        )
        .bind(resource.id)
        .bind(resource.occupied)
        .bind(&resource.attendees)
        .bind(&resource.waitlist)
        .bind(resource.version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_accepting(
        pool: &PgPool,
        id: DbId,
        accepting: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE resources
             SET accepting_check_ins = $2, version = version + 1, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(accepting)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
