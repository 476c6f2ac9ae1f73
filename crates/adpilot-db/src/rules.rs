//! Database operations for `rules`.

use adpilot_core::RuleRecord;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

const RULE_COLUMNS: &str = "id, account_id, name, description, enabled, schedule, \
                            conditions, actions, meta_account_id, meta_access_token, \
                            last_run_at, next_run_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `rules` table.
///
/// `conditions` and `actions` are the raw JSONB documents; they are validated
/// into typed rules by `adpilot_core::Rule::from_record`.
#[derive(Clone, sqlx::FromRow)]
pub struct RuleRow {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub schedule: Option<String>,
    pub conditions: Value,
    pub actions: Value,
    pub meta_account_id: Option<String>,
    pub meta_access_token: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for RuleRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRow")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("schedule", &self.schedule)
            .field(
                "meta_access_token",
                &self.meta_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("next_run_at", &self.next_run_at)
            .finish_non_exhaustive()
    }
}

impl From<RuleRow> for RuleRecord {
    fn from(row: RuleRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            name: row.name,
            description: row.description,
            enabled: row.enabled,
            schedule: row.schedule,
            conditions: row.conditions,
            actions: row.actions,
            meta_account_id: row.meta_account_id,
            meta_access_token: row.meta_access_token,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
        }
    }
}

/// Fields for a new rule.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub account_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub schedule: Option<String>,
    pub conditions: Value,
    pub actions: Value,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub conditions: Option<Value>,
    pub actions: Option<Value>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inserts a rule and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including an unknown
/// `account_id`).
pub async fn create_rule(pool: &PgPool, new: &NewRule) -> Result<RuleRow, DbError> {
    let sql = format!(
        "INSERT INTO rules (account_id, name, description, enabled, schedule, conditions, actions) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {RULE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, RuleRow>(&sql)
        .bind(new.account_id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.enabled)
        .bind(&new.schedule)
        .bind(&new.conditions)
        .bind(&new.actions)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Fetches a rule by `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no rule has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_rule(pool: &PgPool, id: i64) -> Result<RuleRow, DbError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = $1");
    let row = sqlx::query_as::<_, RuleRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns all rules ordered by `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_rules(pool: &PgPool) -> Result<Vec<RuleRow>, DbError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM rules ORDER BY id");
    let rows = sqlx::query_as::<_, RuleRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Returns the rules owned by one account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_rules_by_account(
    pool: &PgPool,
    account_id: i64,
) -> Result<Vec<RuleRow>, DbError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE account_id = $1 ORDER BY id");
    let rows = sqlx::query_as::<_, RuleRow>(&sql)
        .bind(account_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Enabled rules with a non-empty schedule.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_scheduled_rules(pool: &PgPool) -> Result<Vec<RuleRow>, DbError> {
    let sql = format!(
        "SELECT {RULE_COLUMNS} FROM rules \
         WHERE enabled = TRUE AND schedule IS NOT NULL AND btrim(schedule) <> '' \
         ORDER BY id"
    );
    let rows = sqlx::query_as::<_, RuleRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

/// Applies a partial update and returns the new row.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no rule has the given `id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_rule(pool: &PgPool, id: i64, update: &RuleUpdate) -> Result<RuleRow, DbError> {
    let sql = format!(
        "UPDATE rules SET \
             name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             enabled = COALESCE($4, enabled), \
             conditions = COALESCE($5, conditions), \
             actions = COALESCE($6, actions), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {RULE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, RuleRow>(&sql)
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.enabled)
        .bind(&update.conditions)
        .bind(&update.actions)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Deletes a rule; its logs go with it via `ON DELETE CASCADE`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no rule has the given `id`, or
/// [`DbError::Sqlx`] if the delete fails.
pub async fn delete_rule(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM rules WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// Replaces the stored schedule string; `None` makes the rule manual-only.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no rule has the given `id`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn set_schedule(pool: &PgPool, id: i64, schedule: Option<&str>) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE rules SET schedule = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(schedule)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_next_run_at(
    pool: &PgPool,
    id: i64,
    next_run_at: Option<DateTime<Utc>>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE rules SET next_run_at = $2 WHERE id = $1")
        .bind(id)
        .bind(next_run_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn set_last_run_at(
    pool: &PgPool,
    id: i64,
    last_run_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query("UPDATE rules SET last_run_at = $2 WHERE id = $1")
        .bind(id)
        .bind(last_run_at)
        .execute(pool)
        .await?;
    Ok(())
}
