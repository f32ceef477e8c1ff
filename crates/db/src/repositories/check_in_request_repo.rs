//! Repository for the `check_in_requests` table.
//!
//! Every status change is guarded by `status_id = pending` so the first
//! writer wins and later writers see zero affected rows.

use covenant_core::models::{NewCheckInRequest, RequestTransition};
use covenant_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::check_in_request::CheckInRequestRow;
use crate::models::status::CheckInRequestStatus;

/// Column list for check_in_requests queries.
const COLUMNS: &str = "id, participant_id, resource_id, requester_id, token, status_id, \
    created_at, expires_at, processed_by, processed_at, rejection_reason, notes, \
    attendance_record_id";

pub struct CheckInRequestRepo;

impl CheckInRequestRepo {
    /// Insert a new pending request. A duplicate token fails with the
    /// `uq_check_in_requests_token` unique violation.
    pub async fn create(
        pool: &PgPool,
        input: &NewCheckInRequest,
    ) -> Result<CheckInRequestRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO check_in_requests
                (participant_id, resource_id, requester_id, token, status_id,
                 created_at, expires_at, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CheckInRequestRow>(&query)
            .bind(input.participant_id)
            .bind(input.resource_id)
            .bind(&input.requester_id)
            .bind(&input.token)
            .bind(CheckInRequestStatus::Pending.id())
            .bind(input.created_at)
            .bind(input.expires_at)
            .bind(&input.notes)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<CheckInRequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM check_in_requests WHERE id = $1");
        sqlx::query_as::<_, CheckInRequestRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Exact, case-sensitive token match.
    pub async fn find_by_token(
        pool: &PgPool,
        token: &str,
    ) -> Result<Option<CheckInRequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM check_in_requests WHERE token = $1");
        sqlx::query_as::<_, CheckInRequestRow>(&query)
            .bind(token)
            .fetch_optional(pool)
            .await
    }

    /// The newest pending request for a participant, expired or not.
    pub async fn find_pending_for_participant(
        pool: &PgPool,
        participant_id: DbId,
    ) -> Result<Option<CheckInRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM check_in_requests
             WHERE participant_id = $1 AND status_id = $2
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, CheckInRequestRow>(&query)
            .bind(participant_id)
            .bind(CheckInRequestStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// Compare-and-set from pending. Returns `true` if this call won.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        transition: &RequestTransition,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE check_in_requests
             SET status_id = $2, processed_by = $3, processed_at = $4,
                 rejection_reason = $5, notes = COALESCE($6, notes),
                 attendance_record_id = $7
             WHERE id = $1 AND status_id = $8",
        )
        .bind(id)
        .bind(CheckInRequestStatus::from(transition.to).id())
        .bind(&transition.processed_by)
        .bind(transition.processed_at)
        .bind(&transition.rejection_reason)
        .bind(&transition.notes)
        .bind(transition.attendance_record_id)
        .bind(CheckInRequestStatus::Pending.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire every pending request due at `now`, returning the ids moved.
    pub async fn expire_pending(pool: &PgPool, now: Timestamp) -> Result<Vec<DbId>, sqlx::Error> {
        let rows: Vec<(DbId,)> = sqlx::query_as(
            "UPDATE check_in_requests
             SET status_id = $2, processed_at = $1
             WHERE status_id = $3 AND expires_at <= $1
             RETURNING id",
        )
        .bind(now)
        .bind(CheckInRequestStatus::Expired.id())
        .bind(CheckInRequestStatus::Pending.id())
        .fetch_all(pool)
        .await?;
        let mut ids: Vec<DbId> = rows.into_iter().map(|(id,)| id).collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Pending, unexpired requests for a resource, oldest first.
    pub async fn list_pending_for_resource(
        pool: &PgPool,
        resource_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<CheckInRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM check_in_requests
             WHERE resource_id = $1 AND status_id = $2 AND expires_at > $3
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, CheckInRequestRow>(&query)
            .bind(resource_id)
            .bind(CheckInRequestStatus::Pending.id())
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Every request created by a requester, newest first.
    pub async fn list_for_requester(
        pool: &PgPool,
        requester_id: &str,
    ) -> Result<Vec<CheckInRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM check_in_requests
             WHERE requester_id = $1
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, CheckInRequestRow>(&query)
            .bind(requester_id)
            .fetch_all(pool)
            .await
    }
}
