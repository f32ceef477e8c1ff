//! Repository for the `attendance_records` table.

use covenant_core::models::NewAttendanceRecord;
use covenant_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::attendance::AttendanceRow;
use crate::models::status::AttendanceStatus;

/// Column list for attendance_records queries.
const COLUMNS: &str = "id, participant_id, resource_id, check_in_time, check_out_time, \
    checked_in_by, checked_out_by, status_id, check_in_request_id, notes";

pub struct AttendanceRepo;

impl AttendanceRepo {
    /// Open a record. A second open record for the same participant fails
    /// with the `uq_attendance_records_open` unique violation.
    pub async fn create(
        pool: &PgPool,
        input: &NewAttendanceRecord,
    ) -> Result<AttendanceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO attendance_records
                (participant_id, resource_id, check_in_time, checked_in_by, status_id,
                 check_in_request_id, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(input.participant_id)
            .bind(input.resource_id)
            .bind(input.check_in_time)
            .bind(&input.checked_in_by)
            .bind(AttendanceStatus::CheckedIn.id())
            .bind(input.check_in_request_id)
            .bind(&input.notes)
            .fetch_one(pool)
            .await
    }

    pub async fn find_open_for_participant(
        pool: &PgPool,
        participant_id: DbId,
    ) -> Result<Option<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attendance_records
             WHERE participant_id = $1 AND status_id = $2"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(participant_id)
            .bind(AttendanceStatus::CheckedIn.id())
            .fetch_optional(pool)
            .await
    }

    /// Close an open record. `None` if it was already closed or is missing.
    pub async fn close(
        pool: &PgPool,
        id: DbId,
        at: Timestamp,
        checked_out_by: &str,
        notes: Option<&str>,
    ) -> Result<Option<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "UPDATE attendance_records
             SET status_id = $2, check_out_time = $3, checked_out_by = $4,
                 notes = COALESCE($5, notes), updated_at = NOW()
             WHERE id = $1 AND status_id = $6
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(id)
            .bind(AttendanceStatus::CheckedOut.id())
            .bind(at)
            .bind(checked_out_by)
            .bind(notes)
            .bind(AttendanceStatus::CheckedIn.id())
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attendance_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Open records for a resource, in check-in order.
    pub async fn list_open_for_resource(
        pool: &PgPool,
        resource_id: DbId,
    ) -> Result<Vec<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attendance_records
             WHERE resource_id = $1 AND status_id = $2
             ORDER BY check_in_time ASC, id ASC"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(resource_id)
            .bind(AttendanceStatus::CheckedIn.id())
            .fetch_all(pool)
            .await
    }

    /// All records for a participant, newest first.
    pub async fn list_for_participant(
        pool: &PgPool,
        participant_id: DbId,
    ) -> Result<Vec<AttendanceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attendance_records
             WHERE participant_id = $1
             ORDER BY check_in_time DESC, id DESC"
        );
        sqlx::query_as::<_, AttendanceRow>(&query)
            .bind(participant_id)
            .fetch_all(pool)
            .await
    }
}
