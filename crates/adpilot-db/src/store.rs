//! Postgres-backed [`RuleStore`].

use adpilot_core::{AccountRecord, RuleRecord, RuleStore, RunStatus, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::{accounts, rule_logs, rules, DbError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn not_found_as_none<T>(result: Result<T, DbError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(DbError::NotFound) => Ok(None),
        Err(e) => Err(StoreError::new(e)),
    }
}

#[async_trait]
impl RuleStore for PgStore {
    async fn rule(&self, id: i64) -> Result<Option<RuleRecord>, StoreError> {
        let row = not_found_as_none(rules::get_rule(&self.pool, id).await)?;
        Ok(row.map(RuleRecord::from))
    }

    async fn account(&self, id: i64) -> Result<Option<AccountRecord>, StoreError> {
        let row = not_found_as_none(accounts::get_account(&self.pool, id).await)?;
        Ok(row.map(AccountRecord::from))
    }

    async fn scheduled_rules(&self) -> Result<Vec<RuleRecord>, StoreError> {
        let rows = rules::list_scheduled_rules(&self.pool)
            .await
            .map_err(StoreError::new)?;
        Ok(rows.into_iter().map(RuleRecord::from).collect())
    }

    async fn append_log(
        &self,
        rule_id: i64,
        status: RunStatus,
        message: &str,
        details: &Value,
    ) -> Result<i64, StoreError> {
        let row = rule_logs::create_rule_log(&self.pool, rule_id, status.as_str(), message, details)
            .await
            .map_err(StoreError::new)?;
        Ok(row.id)
    }

    async fn set_next_run(
        &self,
        rule_id: i64,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        rules::set_next_run_at(&self.pool, rule_id, next_run_at)
            .await
            .map_err(StoreError::new)
    }

    async fn set_last_run(&self, rule_id: i64, ran_at: DateTime<Utc>) -> Result<(), StoreError> {
        rules::set_last_run_at(&self.pool, rule_id, ran_at)
            .await
            .map_err(StoreError::new)
    }
}
