//! Typed rule documents.
//!
//! Rules are persisted with their conditions and actions as free-form JSON.
//! This module validates that JSON once, when a rule is loaded, into closed
//! enums. Anything the engine cannot evaluate (an unknown field, operator,
//! token, or action type) is rejected here with a [`RuleDocumentError`].

mod actions;
mod conditions;
pub mod lenient;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;

use crate::schedule::{Schedule, ScheduleError};
use crate::store::RuleRecord;

pub use actions::{parse_actions, ActionKind, ActionSpec, BudgetDirection};
pub use conditions::{
    ConditionClause, ConditionField, ExpectedValue, Metric, Operator, RuleConditions,
    ScopeFilters, SpecialToken, TimeRange, TimeUnit, ValueBase, MAX_TIME_RANGE_AMOUNT,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleDocumentError {
    #[error("invalid rule document: {0}")]
    InvalidDocument(String),

    #[error("unknown rule level '{0}'")]
    UnknownLevel(String),

    #[error("unknown condition field '{0}'")]
    UnknownField(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{operator}' is not supported for field '{field}'")]
    UnsupportedOperator { field: String, operator: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("cpp_winning_days condition requires a numeric threshold")]
    MissingThreshold,

    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("rule has no conditions")]
    NoConditions,

    #[error("unknown action type '{0}'")]
    UnknownActionType(String),

    #[error("invalid {action} action: {reason}")]
    InvalidAction { action: String, reason: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// The object level a rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Campaign,
    AdSet,
    Ad,
}

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Campaign => "campaign",
            Level::AdSet => "ad_set",
            Level::Ad => "ad",
        }
    }

    /// Parses the stored level name; `adset` is accepted as an alias.
    ///
    /// # Errors
    ///
    /// Returns [`RuleDocumentError::UnknownLevel`] for anything else.
    pub fn parse(raw: &str) -> Result<Self, RuleDocumentError> {
        match raw.trim() {
            "campaign" => Ok(Level::Campaign),
            "ad_set" | "adset" => Ok(Level::AdSet),
            "ad" => Ok(Level::Ad),
            other => Err(RuleDocumentError::UnknownLevel(other.to_string())),
        }
    }

    /// Value of the platform's insights `level` parameter.
    #[must_use]
    pub fn insights_level(self) -> &'static str {
        match self {
            Level::Campaign => "campaign",
            Level::AdSet => "adset",
            Level::Ad => "ad",
        }
    }

    /// Account edge that lists objects of this level.
    #[must_use]
    pub fn edge(self) -> &'static str {
        match self {
            Level::Campaign => "campaigns",
            Level::AdSet => "adsets",
            Level::Ad => "ads",
        }
    }

    /// Key under which insight rows carry the object id.
    #[must_use]
    pub fn id_key(self) -> &'static str {
        match self {
            Level::Campaign => "campaign_id",
            Level::AdSet => "adset_id",
            Level::Ad => "ad_id",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-rule credentials that take precedence over the owning account's.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialOverride {
    pub account_id: Option<String>,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for CredentialOverride {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialOverride")
            .field("account_id", &self.account_id)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// A fully validated rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: i64,
    pub account_id: i64,
    pub name: String,
    pub enabled: bool,
    pub schedule: Option<Schedule>,
    pub conditions: RuleConditions,
    pub actions: Vec<ActionSpec>,
    pub credentials: CredentialOverride,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Rule {
    /// Validates a stored rule.
    ///
    /// `default_tz` applies to schedules that do not carry a timezone.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleDocumentError`] found in the conditions,
    /// actions, or schedule.
    pub fn from_record(record: &RuleRecord, default_tz: Tz) -> Result<Self, RuleDocumentError> {
        let conditions = RuleConditions::from_value(&record.conditions)?;
        let actions = parse_actions(&record.actions)?;
        let schedule = match record.schedule.as_deref() {
            Some(raw) => Schedule::parse_stored(raw, default_tz)?,
            None => None,
        };

        Ok(Self {
            id: record.id,
            account_id: record.account_id,
            name: record.name.clone(),
            enabled: record.enabled,
            schedule,
            conditions,
            actions,
            credentials: CredentialOverride {
                account_id: non_blank(record.meta_account_id.as_deref()),
                access_token: non_blank(record.meta_access_token.as_deref()),
            },
            last_run_at: record.last_run_at,
            next_run_at: record.next_run_at,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
#[path = "rules_test.rs"]
mod tests;
