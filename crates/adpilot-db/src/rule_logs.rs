//! Database operations for `rule_logs`.
//!
//! Logs are append-only: one row per rule run.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

pub const DEFAULT_LOG_LIMIT: i64 = 100;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `rule_logs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleLogRow {
    pub id: i64,
    pub rule_id: i64,
    /// One of `success`, `error`, `skipped`.
    pub status: String,
    pub message: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Appends a log entry and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_rule_log(
    pool: &PgPool,
    rule_id: i64,
    status: &str,
    message: &str,
    details: &Value,
) -> Result<RuleLogRow, DbError> {
    let row = sqlx::query_as::<_, RuleLogRow>(
        "INSERT INTO rule_logs (rule_id, status, message, details) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, rule_id, status, message, details, created_at",
    )
    .bind(rule_id)
    .bind(status)
    .bind(message)
    .bind(details)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns a page of a rule's logs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_rule_logs(
    pool: &PgPool,
    rule_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<RuleLogRow>, DbError> {
    let rows = sqlx::query_as::<_, RuleLogRow>(
        "SELECT id, rule_id, status, message, details, created_at \
         FROM rule_logs \
         WHERE rule_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2 OFFSET $3",
    )
    .bind(rule_id)
    .bind(limit)
    .bind(offset.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Deletes one log entry.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no log has the given `id`, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_rule_log(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM rule_logs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
