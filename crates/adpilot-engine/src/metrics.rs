//! Derived metrics computed from a single insight row.
//!
//! Every function here is total: missing or malformed data reads as 0.

use std::collections::BTreeMap;

use adpilot_core::Metric;
use adpilot_meta::Insight;
use serde::Serialize;

/// Purchase action types in order of preference. The platform reports the
/// same purchases under several of these at once; exactly one is used.
pub const PREFERRED_PURCHASE_TYPES: [&str; 7] = [
    "omni_purchase",
    "purchase",
    "offsite_conversion.fb_pixel_purchase",
    "onsite_web_purchase",
    "onsite_web_app_purchase",
    "web_in_store_purchase",
    "web_app_in_store_purchase",
];

/// Action types counted as conversions.
const CONVERSION_TYPES: [&str; 3] = ["purchase", "complete_registration", "lead"];

/// The purchase figure chosen from one action list, with the alternatives it
/// was chosen from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CanonicalPurchase {
    pub value: f64,
    /// `"none"` when the list carried no purchase entries.
    pub action_type: String,
    pub by_type: BTreeMap<String, f64>,
}

/// Picks one purchase variant from an action list: the first preferred type
/// present, else the lexicographically smallest purchase type. Values are
/// never summed across variants.
#[must_use]
pub fn canonical_purchase(insight: &Insight, list: &str) -> CanonicalPurchase {
    let by_type: BTreeMap<String, f64> = insight
        .action_entries(list)
        .into_iter()
        .filter(|e| e.action_type.to_lowercase().contains("purchase"))
        .map(|e| (e.action_type, e.value))
        .collect();

    let chosen = PREFERRED_PURCHASE_TYPES
        .iter()
        .find_map(|t| by_type.get_key_value(*t))
        .or_else(|| by_type.iter().next())
        .map(|(k, v)| (k.clone(), *v));

    match chosen {
        Some((action_type, value)) => CanonicalPurchase {
            value,
            action_type,
            by_type,
        },
        None => CanonicalPurchase {
            value: 0.0,
            action_type: "none".to_string(),
            by_type,
        },
    }
}

#[must_use]
pub fn purchase_count(insight: &Insight) -> f64 {
    canonical_purchase(insight, "actions").value
}

#[must_use]
pub fn purchase_value(insight: &Insight) -> f64 {
    canonical_purchase(insight, "action_values").value
}

/// Cost per purchase.
///
/// Platform-reported figures win: first `cost_per_action_type`, then a
/// purchase `cost_per_result`. Otherwise `spend / purchases`, or 0 without
/// purchases.
#[must_use]
pub fn cpp(insight: &Insight) -> f64 {
    let reported = canonical_purchase(insight, "cost_per_action_type");
    if reported.value > 0.0 {
        return reported.value;
    }
    if let Some(result) = insight.cost_per_purchase_result() {
        return result;
    }
    let purchases = purchase_count(insight);
    if purchases > 0.0 {
        insight.spend() / purchases
    } else {
        0.0
    }
}

#[must_use]
pub fn roas(insight: &Insight) -> f64 {
    let spend = insight.spend();
    if spend <= 0.0 {
        return 0.0;
    }
    let revenue = purchase_value(insight);
    if revenue <= 0.0 {
        return 0.0;
    }
    revenue / spend
}

#[must_use]
pub fn conversions(insight: &Insight) -> f64 {
    insight
        .action_entries("actions")
        .into_iter()
        .filter(|e| CONVERSION_TYPES.contains(&e.action_type.as_str()))
        .map(|e| e.value)
        .sum()
}

/// `purchase_value - spend`, equal to `(AOV - CPP) × purchases` when both
/// figures share a window and attribution.
#[must_use]
pub fn media_margin_volume(insight: &Insight) -> f64 {
    purchase_value(insight) - insight.spend()
}

/// Computes `metric` from `insight`. An empty insight yields 0 for every metric.
#[must_use]
pub fn compute(insight: &Insight, metric: Metric) -> f64 {
    if insight.is_empty() {
        return 0.0;
    }
    match metric {
        Metric::Spend => insight.spend(),
        Metric::Impressions => insight.number("impressions"),
        Metric::Clicks => insight.number("clicks"),
        Metric::Ctr => insight.number("ctr"),
        Metric::Cpc => insight.number("cpc"),
        Metric::Cpm => insight.number("cpm"),
        Metric::Cpp => cpp(insight),
        Metric::Roas => roas(insight),
        Metric::Conversions => conversions(insight),
        Metric::PurchaseCount => purchase_count(insight),
        Metric::PurchaseValue => purchase_value(insight),
        Metric::MediaMarginVolume => media_margin_volume(insight),
    }
}

/// Audit breakdown attached to `media_margin_volume` evaluations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginBreakdown {
    pub metric: &'static str,
    pub formula: &'static str,
    pub purchase_value: f64,
    pub purchase_value_source: &'static str,
    pub spend: f64,
    pub purchase_count: f64,
    pub purchase_count_action_type_used: String,
    pub purchase_count_by_action_type: BTreeMap<String, f64>,
    pub purchase_value_action_type_used: String,
    pub purchase_value_by_action_type: BTreeMap<String, f64>,
    pub aov: Option<f64>,
    pub cpp: f64,
    pub result: f64,
    pub note: &'static str,
}

impl MarginBreakdown {
    #[must_use]
    pub fn from_insight(insight: &Insight) -> Self {
        let spend = insight.spend();
        let count = canonical_purchase(insight, "actions");
        let value = canonical_purchase(insight, "action_values");
        let aov = (count.value > 0.0).then(|| value.value / count.value);
        let result = value.value - spend;

        Self {
            metric: "media_margin_volume",
            formula: "purchase_value - spend  (equivalent to (AOV - CPP) × Purchases \
                      when CPP=spend/purchases and AOV=value/purchases)",
            purchase_value: value.value,
            purchase_value_source: if value.value > 0.0 {
                "action_values"
            } else {
                "none"
            },
            spend,
            purchase_count: count.value,
            purchase_count_action_type_used: count.action_type,
            purchase_count_by_action_type: count.by_type,
            purchase_value_action_type_used: value.action_type,
            purchase_value_by_action_type: value.by_type,
            aov,
            cpp: cpp(insight),
            result,
            note: "If purchase_value is 0, verify Insights returns action_values for the \
                   selected time range/attribution.",
        }
    }
}
