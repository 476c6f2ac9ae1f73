//! Database operations for `ad_accounts`.

use adpilot_core::AccountRecord;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `ad_accounts` table.
#[derive(Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub meta_account_id: Option<String>,
    pub meta_access_token: Option<String>,
    pub notification_webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccountRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("meta_account_id", &self.meta_account_id)
            .field(
                "meta_access_token",
                &self.meta_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl From<AccountRow> for AccountRecord {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            meta_account_id: row.meta_account_id,
            meta_access_token: row.meta_access_token,
            notification_webhook_url: row.notification_webhook_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Fetches a single account by `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no account has the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_account(pool: &PgPool, id: i64) -> Result<AccountRow, DbError> {
    let row = sqlx::query_as::<_, AccountRow>(
        "SELECT id, name, meta_account_id, meta_access_token, notification_webhook_url, \
                created_at, updated_at \
         FROM ad_accounts \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns all accounts ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_accounts(pool: &PgPool) -> Result<Vec<AccountRow>, DbError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        "SELECT id, name, meta_account_id, meta_access_token, notification_webhook_url, \
                created_at, updated_at \
         FROM ad_accounts \
         ORDER BY name, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
