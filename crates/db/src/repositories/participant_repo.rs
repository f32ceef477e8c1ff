//! Repository for the `participants` table.

use covenant_core::models::{NewParticipant, Participant};
use covenant_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::participant::ParticipantRow;
use crate::models::status::ParticipantStatus;

/// Column list for participants queries.
const COLUMNS: &str = "id, guardian_id, first_name, last_name, birth_date, status_id, \
    current_resource_id, last_check_in, last_check_out, created_at, updated_at";

pub struct ParticipantRepo;

impl ParticipantRepo {
    pub async fn create(
        pool: &PgPool,
        input: &NewParticipant,
    ) -> Result<ParticipantRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO participants (guardian_id, first_name, last_name, birth_date)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ParticipantRow>(&query)
            .bind(&input.guardian_id)
            .bind(&input.first_name)
            .bind(&input.last_name)
            .bind(input.birth_date)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ParticipantRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM participants WHERE id = $1");
        sqlx::query_as::<_, ParticipantRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM participants WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    /// List a guardian's children, ordered by id.
    pub async fn list_for_guardian(
        pool: &PgPool,
        guardian_id: &str,
    ) -> Result<Vec<ParticipantRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM participants WHERE guardian_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, ParticipantRow>(&query)
            .bind(guardian_id)
            .fetch_all(pool)
            .await
    }

    /// Flip to checked in unless already checked in. Returns `true` if the
    /// row was updated.
    pub async fn mark_checked_in(
        pool: &PgPool,
        id: DbId,
        resource_id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE participants
             SET status_id = $2, current_resource_id = $3, last_check_in = $4, updated_at = NOW()
             WHERE id = $1 AND status_id <> $2",
        )
        .bind(id)
        .bind(ParticipantStatus::CheckedIn.id())
        .bind(resource_id)
        .bind(at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Flip to checked out iff currently checked in.
    pub async fn mark_checked_out(
        pool: &PgPool,
        id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE participants
             SET status_id = $2, current_resource_id = NULL, last_check_out = $3, updated_at = NOW()
             WHERE id = $1 AND status_id = $4",
        )
        .bind(id)
        .bind(ParticipantStatus::CheckedOut.id())
        .bind(at)
        .bind(ParticipantStatus::CheckedIn.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Put back the status fields of a previously read participant.
    pub async fn restore(pool: &PgPool, snapshot: &Participant) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE participants
             SET status_id = $2, current_resource_id = $3,
                 last_check_in = $4, last_check_out = $5, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(snapshot.id)
        .bind(ParticipantStatus::from(snapshot.status).id())
        .bind(snapshot.current_resource_id)
        .bind(snapshot.last_check_in)
        .bind(snapshot.last_check_out)
        .execute(pool)
        .await?;
        Ok(())
    }
}
