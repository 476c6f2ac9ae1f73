//! Persistence boundary used by the rule runner and the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
    Skipped,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// A rule as stored, before its documents are validated.
#[derive(Clone, PartialEq)]
pub struct RuleRecord {
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
}

impl std::fmt::Debug for RuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRecord")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("schedule", &self.schedule)
            .field("meta_account_id", &self.meta_account_id)
            .field(
                "meta_access_token",
                &self.meta_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("last_run_at", &self.last_run_at)
            .field("next_run_at", &self.next_run_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: i64,
    pub name: String,
    pub meta_account_id: Option<String>,
    pub meta_access_token: Option<String>,
    pub notification_webhook_url: Option<String>,
}

impl std::fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("meta_account_id", &self.meta_account_id)
            .field(
                "meta_access_token",
                &self.meta_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "notification_webhook_url",
                &self.notification_webhook_url.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Opaque failure from a [`RuleStore`] implementation.
#[derive(Debug, thiserror::Error)]
#[error("store error: {0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn rule(&self, id: i64) -> Result<Option<RuleRecord>, StoreError>;

    async fn account(&self, id: i64) -> Result<Option<AccountRecord>, StoreError>;

    /// Enabled rules that carry a schedule.
    async fn scheduled_rules(&self) -> Result<Vec<RuleRecord>, StoreError>;

    /// Appends one run log and returns its id.
    async fn append_log(
        &self,
        rule_id: i64,
        status: RunStatus,
        message: &str,
        details: &Value,
    ) -> Result<i64, StoreError>;

    async fn set_next_run(
        &self,
        rule_id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn set_last_run(&self, rule_id: i64, ran_at: DateTime<Utc>) -> Result<(), StoreError>;
}
