//! Payload types for the Marketing API.
//!
//! Objects and insight rows are kept as property bags: the platform adds and
//! renames fields between versions, and the audit log stores them verbatim.

use adpilot_core::rules::lenient;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A campaign, ad set, or ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdObject(pub Map<String, Value>);

impl AdObject {
    fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.text("id").unwrap_or_default()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.text("name").unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.text("status").filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn effective_status(&self) -> Option<&str> {
        self.text("effective_status").filter(|s| !s.is_empty())
    }

    /// Configured status, falling back to the computed effective status.
    #[must_use]
    pub fn display_status(&self) -> Option<&str> {
        self.status().or_else(|| self.effective_status())
    }

    #[must_use]
    pub fn campaign_id(&self) -> Option<&str> {
        self.text("campaign_id").filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn adset_id(&self) -> Option<&str> {
        self.text("adset_id").filter(|s| !s.is_empty())
    }

    /// Daily budget in minor currency units, as stored by the platform.
    #[must_use]
    pub fn daily_budget_cents(&self) -> Option<f64> {
        self.0.get("daily_budget").and_then(lenient::number)
    }

    #[must_use]
    pub fn lifetime_budget_cents(&self) -> Option<f64> {
        self.0.get("lifetime_budget").and_then(lenient::number)
    }

    /// Configured status (or, failing that, effective status) is ACTIVE.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.display_status() == Some("ACTIVE")
    }
}

/// One `{action_type, value}` pair from `actions`, `action_values`, or
/// `cost_per_action_type`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEntry {
    pub action_type: String,
    pub value: f64,
}

/// An insight row. Empty when the platform returned nothing for the object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Insight(pub Map<String, Value>);

impl Insight {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Numeric field; unparsable or missing values read as 0.
    #[must_use]
    pub fn number(&self, key: &str) -> f64 {
        self.0.get(key).and_then(lenient::number).unwrap_or(0.0)
    }

    #[must_use]
    pub fn spend(&self) -> f64 {
        self.number("spend")
    }

    #[must_use]
    pub fn date_start(&self) -> Option<&str> {
        self.0.get("date_start").and_then(Value::as_str)
    }

    #[must_use]
    pub fn object_id(&self, id_key: &str) -> Option<&str> {
        self.0
            .get(id_key)
            .or_else(|| self.0.get("id"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Reads an action list; entries without an `action_type` are skipped.
    #[must_use]
    pub fn action_entries(&self, key: &str) -> Vec<ActionEntry> {
        let Some(Value::Array(items)) = self.0.get(key) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|entry| {
                let action_type = entry.get("action_type")?.as_str()?.to_string();
                let value = entry.get("value").and_then(lenient::number).unwrap_or(0.0);
                Some(ActionEntry { action_type, value })
            })
            .collect()
    }

    /// Purchase cost from a `cost_per_result` entry whose indicator mentions
    /// purchases, when the platform supplies one.
    #[must_use]
    pub fn cost_per_purchase_result(&self) -> Option<f64> {
        let Some(Value::Array(results)) = self.0.get("cost_per_result") else {
            return None;
        };
        results
            .iter()
            .filter_map(Value::as_object)
            .filter(|r| {
                r.get("indicator")
                    .and_then(Value::as_str)
                    .is_some_and(|i| i.to_lowercase().contains("purchase"))
            })
            .find_map(|r| {
                r.get("values")?
                    .as_array()?
                    .first()?
                    .get("value")
                    .and_then(lenient::number)
                    .filter(|v| *v > 0.0)
            })
    }
}

/// Credentials for one ad account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    account_id: String,
    access_token: String,
}

impl Credentials {
    /// `account_id` is normalised to the `act_` form.
    #[must_use]
    pub fn new(account_id: &str, access_token: &str) -> Self {
        let trimmed = account_id.trim();
        let account_id = if trimmed.starts_with("act_") {
            trimmed.to_string()
        } else {
            format!("act_{trimmed}")
        };
        Self {
            account_id,
            access_token: access_token.trim().to_string(),
        }
    }

    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("access_token", &"[redacted]")
            .finish()
    }
}
