//! Server-side `filtering` parameters and per-level field selections.

use adpilot_core::Level;
use serde_json::{json, Value};

/// Statuses never worth fetching: the platform cannot act on them.
pub const EXCLUDED_STATUSES: [&str; 2] = ["ARCHIVED", "DELETED"];

/// Filters pushed to the collection endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectFilter {
    /// `effective_status IN` allow-list. Empty means no allow-list.
    pub statuses: Vec<String>,
    /// Campaign ids the objects must belong to. Empty means any campaign.
    pub campaign_ids: Vec<String>,
}

impl ObjectFilter {
    /// JSON array for the `filtering` query parameter.
    #[must_use]
    pub fn to_param(&self, level: Level) -> String {
        let mut filters = vec![json!({
            "field": "effective_status",
            "operator": "NOT_IN",
            "value": EXCLUDED_STATUSES,
        })];

        let statuses: Vec<&str> = self
            .statuses
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        if !statuses.is_empty() {
            filters.push(json!({
                "field": "effective_status",
                "operator": "IN",
                "value": statuses,
            }));
        }

        if !self.campaign_ids.is_empty() {
            let field = match level {
                Level::Campaign => "id",
                Level::AdSet | Level::Ad => "campaign.id",
            };
            filters.push(json!({
                "field": field,
                "operator": "IN",
                "value": self.campaign_ids,
            }));
        }

        Value::Array(filters).to_string()
    }
}

/// `filtering` for an insights batch: the rows of exactly these objects.
#[must_use]
pub fn insights_filter(level: Level, ids: &[String]) -> String {
    json!([{
        "field": format!("{}.id", level.insights_level()),
        "operator": "IN",
        "value": ids,
    }])
    .to_string()
}

/// Fields requested from the collection endpoint for `level`.
#[must_use]
pub fn object_fields(level: Level) -> &'static str {
    match level {
        Level::Campaign => "id,name,status,effective_status",
        Level::AdSet => "id,name,campaign_id,status,effective_status,daily_budget,lifetime_budget",
        Level::Ad => "id,name,adset_id,campaign_id,status,effective_status",
    }
}

/// Page size for collection fetches. Ads are numerous and light.
#[must_use]
pub fn page_limit(level: Level) -> u32 {
    match level {
        Level::Ad => 3000,
        Level::AdSet | Level::Campaign => 2000,
    }
}

pub const INSIGHT_FIELDS: &str = "campaign_id,adset_id,ad_id,spend,impressions,clicks,cpc,cpm,ctr,\
actions,action_values,cost_per_action_type,cost_per_result";

pub const DAILY_INSIGHT_FIELDS: &str = "campaign_id,adset_id,ad_id,spend,impressions,clicks,\
actions,action_values,cost_per_action_type,date_start,date_stop";

pub const CHILD_AD_FIELDS: &str = "id,name,status,effective_status";
