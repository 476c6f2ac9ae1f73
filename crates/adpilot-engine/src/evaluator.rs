//! Evaluates one condition clause against one fetched item.
//!
//! Evaluation never fails: data that cannot be resolved makes the clause
//! evaluate to false, and the reason is visible in the returned record.

use std::collections::HashMap;

use adpilot_core::{
    ConditionClause, ConditionField, ExpectedValue, Metric, Operator, SpecialToken, ValueBase,
};
use adpilot_meta::{AdObject, Insight};
use serde::Serialize;
use serde_json::Value;

use crate::metrics::{self, MarginBreakdown};
use crate::signals::{WinningDay, WinningDays};

/// Tolerance for `=` and `!=` on metric values.
pub const EQUALITY_EPSILON: f64 = 0.01;

/// Everything known about one item when its clauses are evaluated.
#[derive(Debug, Clone, Copy)]
pub struct ItemContext<'a> {
    pub item: &'a AdObject,
    /// Aggregate row for the clause's window; empty when the platform had none.
    pub insight: &'a Insight,
    pub campaign_statuses: &'a HashMap<String, String>,
    pub winning_days: Option<&'a WinningDays>,
    pub active_ads: Option<usize>,
}

/// Audit record of one clause evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub field: &'static str,
    pub operator: Operator,
    pub expected_expression: String,
    pub expected_value: Value,
    pub actual_value: Value,
    pub passed: bool,
    /// `"global"` or the clause's own window. Filled in by the runner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range_used: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpp_winning_days_breakdown: Option<Vec<WinningDay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpp_winning_days_total_days: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation_details: Option<MarginBreakdown>,
}

/// Budgets are stored in minor units.
fn cents_to_units(cents: Option<f64>) -> Option<f64> {
    cents.map(|c| c / 100.0)
}

fn resolve_token(token: SpecialToken, ctx: &ItemContext<'_>) -> f64 {
    match token {
        SpecialToken::DailyBudget => cents_to_units(ctx.item.daily_budget_cents()).unwrap_or(0.0),
        SpecialToken::LifetimeBudget => {
            cents_to_units(ctx.item.lifetime_budget_cents()).unwrap_or(0.0)
        }
        SpecialToken::CurrentSpend => metrics::compute(ctx.insight, Metric::Spend),
    }
}

/// Numeric value of an expected value, `(base × mul) + add` for expressions.
/// `None` for text values.
#[must_use]
pub fn resolve_expected(value: &ExpectedValue, ctx: &ItemContext<'_>) -> Option<f64> {
    match value {
        ExpectedValue::Number(n) => Some(*n),
        ExpectedValue::Text(_) => None,
        ExpectedValue::Expression { base, mul, add } => {
            let base = match base {
                ValueBase::Literal(n) => *n,
                ValueBase::Token(token) => resolve_token(*token, ctx),
            };
            Some(base * mul + add)
        }
    }
}

/// Numeric comparison. A non-zero `epsilon` loosens `=` and `!=`; zero
/// makes them exact.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn compare(actual: f64, operator: Operator, expected: f64, epsilon: f64) -> bool {
    let equal = if epsilon > 0.0 {
        (actual - expected).abs() < epsilon
    } else {
        actual == expected
    };
    match operator {
        Operator::Gt => actual > expected,
        Operator::Ge => actual >= expected,
        Operator::Lt => actual < expected,
        Operator::Le => actual <= expected,
        Operator::Eq => equal,
        Operator::Ne => !equal,
    }
}

fn number_value(n: f64) -> Value {
    serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn text_of(value: &ExpectedValue) -> String {
    match value {
        ExpectedValue::Text(s) => s.clone(),
        other => other.expression_text(),
    }
}

/// Evaluates `clause` for the item in `ctx`.
#[must_use]
pub fn evaluate(clause: &ConditionClause, ctx: &ItemContext<'_>) -> Evaluation {
    let expected_num = resolve_expected(&clause.value, ctx);
    let expected_value = match (&clause.value, expected_num) {
        (ExpectedValue::Text(s), _) => Value::String(s.clone()),
        (_, Some(n)) => number_value(n),
        (_, None) => Value::Null,
    };

    let mut evaluation = Evaluation {
        field: clause.field.name(),
        operator: clause.operator,
        expected_expression: clause.value.expression_text(),
        expected_value,
        actual_value: Value::Null,
        passed: false,
        time_range_used: None,
        threshold: None,
        cpp_winning_days_breakdown: None,
        cpp_winning_days_total_days: None,
        calculation_details: None,
    };

    let numeric = |actual: f64, epsilon: f64| {
        expected_num.is_some_and(|expected| compare(actual, clause.operator, expected, epsilon))
    };

    match clause.field {
        ConditionField::Status => {
            let actual = ctx.item.display_status();
            let expected = text_of(&clause.value);
            let equal = actual.is_some_and(|a| a == expected);
            evaluation.actual_value = actual.map_or(Value::Null, |a| Value::String(a.to_string()));
            evaluation.passed = match clause.operator {
                Operator::Eq => equal,
                _ => !equal,
            };
        }

        ConditionField::CampaignStatus => {
            let actual = ctx
                .item
                .campaign_id()
                .and_then(|id| ctx.campaign_statuses.get(id));
            if let Some(actual) = actual {
                let equal = *actual == text_of(&clause.value);
                evaluation.actual_value = Value::String(actual.clone());
                evaluation.passed = match clause.operator {
                    Operator::Eq => equal,
                    _ => !equal,
                };
            }
        }

        ConditionField::NameContains => {
            let name = ctx.item.name();
            let contains = name
                .to_lowercase()
                .contains(&text_of(&clause.value).to_lowercase());
            evaluation.actual_value = Value::String(name.to_string());
            evaluation.passed = match clause.operator {
                Operator::Eq => contains,
                _ => !contains,
            };
        }

        ConditionField::DailyBudget => {
            // Exact comparison for `=`/`!=`, unlike metrics.
            if let Some(actual) = cents_to_units(ctx.item.daily_budget_cents()) {
                evaluation.actual_value = number_value(actual);
                evaluation.passed = numeric(actual, 0.0);
            }
        }

        ConditionField::CppWinningDays { threshold } => {
            evaluation.threshold = Some(threshold);
            let (wins, days, total) = ctx.winning_days.map_or((0, Vec::new(), 0), |w| {
                (w.wins, w.days.clone(), w.total_days())
            });
            #[allow(clippy::cast_precision_loss)]
            let actual = wins as f64;
            evaluation.actual_value = Value::from(wins);
            evaluation.passed = numeric(actual, EQUALITY_EPSILON);
            evaluation.cpp_winning_days_breakdown = Some(days);
            evaluation.cpp_winning_days_total_days = Some(total);
        }

        ConditionField::AmountOfActiveAds => {
            let count = ctx.active_ads.unwrap_or(0);
            #[allow(clippy::cast_precision_loss)]
            let actual = count as f64;
            evaluation.actual_value = Value::from(count);
            evaluation.passed = numeric(actual, EQUALITY_EPSILON);
        }

        ConditionField::Metric(metric) => {
            let actual = metrics::compute(ctx.insight, metric);
            if metric == Metric::MediaMarginVolume {
                evaluation.calculation_details = Some(MarginBreakdown::from_insight(ctx.insight));
            }
            evaluation.actual_value = number_value(actual);
            evaluation.passed = numeric(actual, EQUALITY_EPSILON);
        }
    }

    evaluation
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn clause(doc: Value) -> ConditionClause {
        ConditionClause::from_value(&doc).unwrap()
    }

    fn object(doc: Value) -> AdObject {
        serde_json::from_value(doc).unwrap()
    }

    fn insight(doc: Value) -> Insight {
        serde_json::from_value(doc).unwrap()
    }

    struct Fixture {
        item: AdObject,
        insight: Insight,
        statuses: HashMap<String, String>,
    }

    impl Fixture {
        fn new(item: Value, insight_doc: Value) -> Self {
            Self {
                item: object(item),
                insight: insight(insight_doc),
                statuses: HashMap::new(),
            }
        }

        fn ctx(&self) -> ItemContext<'_> {
            ItemContext {
                item: &self.item,
                insight: &self.insight,
                campaign_statuses: &self.statuses,
                winning_days: None,
                active_ads: None,
            }
        }
    }

    #[test]
    fn daily_budget_converts_cents() {
        let f = Fixture::new(json!({"id": "1", "daily_budget": "5000"}), json!({}));
        let eval = evaluate(
            &clause(json!({"field": "daily_budget", "operator": ">", "value": 40})),
            &f.ctx(),
        );
        assert!(eval.passed);
        assert_eq!(eval.actual_value, json!(50.0));
    }

    #[test]
    fn daily_budget_equality_is_exact() {
        let f = Fixture::new(json!({"id": "1", "daily_budget": "5000"}), json!({}));
        let eval = evaluate(
            &clause(json!({"field": "daily_budget", "operator": "=", "value": 50.005})),
            &f.ctx(),
        );
        assert!(!eval.passed);
    }

    #[test]
    fn missing_daily_budget_fails() {
        let f = Fixture::new(json!({"id": "1"}), json!({}));
        let eval = evaluate(
            &clause(json!({"field": "daily_budget", "operator": "<", "value": 1000})),
            &f.ctx(),
        );
        assert!(!eval.passed);
        assert_eq!(eval.actual_value, Value::Null);
    }

    #[test]
    fn budget_expression_resolves_against_item() {
        let f = Fixture::new(json!({"id": "1", "daily_budget": 5000}), json!({}));
        let c = clause(json!({
            "field": "spend",
            "operator": ">",
            "value": {"base": "__daily_budget__", "mul": 1.2, "add": 0}
        }));
        assert_eq!(resolve_expected(&c.value, &f.ctx()), Some(60.0));
        let eval = evaluate(&c, &f.ctx());
        assert_eq!(eval.expected_value, json!(60.0));
        assert_eq!(eval.expected_expression, "__daily_budget__ × 1.2");
    }

    #[test]
    fn current_spend_token_reads_insight() {
        let f = Fixture::new(json!({"id": "1"}), json!({"spend": "80"}));
        let c = clause(json!({
            "field": "spend",
            "operator": "<=",
            "value": {"base": "__current_spend__", "add": -10}
        }));
        assert_eq!(resolve_expected(&c.value, &f.ctx()), Some(70.0));
        assert!(!evaluate(&c, &f.ctx()).passed);
    }

    #[test]
    fn metric_equality_uses_epsilon() {
        let f = Fixture::new(json!({"id": "1"}), json!({"spend": "100.004"}));
        let eq = evaluate(
            &clause(json!({"field": "spend", "operator": "=", "value": 100})),
            &f.ctx(),
        );
        assert!(eq.passed);
        let ne = evaluate(
            &clause(json!({"field": "spend", "operator": "!=", "value": 100})),
            &f.ctx(),
        );
        assert!(!ne.passed);
    }

    #[test]
    fn status_falls_back_to_effective_status() {
        let f = Fixture::new(json!({"id": "1", "effective_status": "PAUSED"}), json!({}));
        let eval = evaluate(
            &clause(json!({"field": "status", "operator": "=", "value": "PAUSED"})),
            &f.ctx(),
        );
        assert!(eval.passed);
        assert_eq!(eval.actual_value, json!("PAUSED"));
    }

    #[test]
    fn status_comparison_is_case_sensitive() {
        let f = Fixture::new(json!({"id": "1", "status": "ACTIVE"}), json!({}));
        let eq = evaluate(
            &clause(json!({"field": "status", "operator": "=", "value": "active"})),
            &f.ctx(),
        );
        assert!(!eq.passed);
        let ne = evaluate(
            &clause(json!({"field": "status", "operator": "!=", "value": "active"})),
            &f.ctx(),
        );
        assert!(ne.passed);
    }

    #[test]
    fn campaign_status_comparison_is_case_sensitive() {
        let mut f = Fixture::new(json!({"id": "1", "campaign_id": "77"}), json!({}));
        f.statuses.insert("77".into(), "ACTIVE".into());
        let eval = evaluate(
            &clause(json!({"field": "campaign_status", "operator": "=", "value": "active"})),
            &f.ctx(),
        );
        assert!(!eval.passed);
        assert_eq!(eval.actual_value, json!("ACTIVE"));
    }

    #[test]
    fn campaign_status_missing_from_cache_fails_both_ways() {
        let f = Fixture::new(json!({"id": "1", "campaign_id": "77"}), json!({}));
        for op in ["=", "!="] {
            let eval = evaluate(
                &clause(json!({"field": "campaign_status", "operator": op, "value": "ACTIVE"})),
                &f.ctx(),
            );
            assert!(!eval.passed, "operator {op}");
            assert_eq!(eval.actual_value, Value::Null);
        }
    }

    #[test]
    fn campaign_status_uses_cache() {
        let mut f = Fixture::new(json!({"id": "1", "campaign_id": "77"}), json!({}));
        f.statuses.insert("77".into(), "ACTIVE".into());
        let eval = evaluate(
            &clause(json!({"field": "campaign_status", "operator": "!=", "value": "PAUSED"})),
            &f.ctx(),
        );
        assert!(eval.passed);
    }

    #[test]
    fn name_contains_is_case_insensitive_and_invertible() {
        let f = Fixture::new(json!({"id": "1", "name": "Summer Sale - Retargeting"}), json!({}));
        let contains = evaluate(
            &clause(json!({"field": "name_contains", "operator": "=", "value": "summer"})),
            &f.ctx(),
        );
        assert!(contains.passed);
        let excludes = evaluate(
            &clause(json!({"field": "name_contains", "operator": "!=", "value": "SUMMER"})),
            &f.ctx(),
        );
        assert!(!excludes.passed);
    }

    #[test]
    fn winning_days_count_is_compared() {
        let f = Fixture::new(json!({"id": "1"}), json!({}));
        let wins = WinningDays::compute(
            &[insight(json!({
                "date_start": "2026-03-01", "spend": "10",
                "actions": [{"action_type": "purchase", "value": "1"}]
            }))],
            15.0,
        );
        let ctx = ItemContext {
            winning_days: Some(&wins),
            ..f.ctx()
        };
        let eval = evaluate(
            &clause(json!({"field": "cpp_winning_days", "operator": ">=", "value": 1, "threshold": 15})),
            &ctx,
        );
        assert!(eval.passed);
        assert_eq!(eval.threshold, Some(15.0));
        assert_eq!(eval.cpp_winning_days_total_days, Some(1));
    }

    #[test]
    fn active_ads_default_to_zero() {
        let f = Fixture::new(json!({"id": "1"}), json!({}));
        let eval = evaluate(
            &clause(json!({"field": "amount_of_active_ads", "operator": "=", "value": 0})),
            &f.ctx(),
        );
        assert!(eval.passed);
        let ctx = ItemContext {
            active_ads: Some(3),
            ..f.ctx()
        };
        let eval = evaluate(
            &clause(json!({"field": "amount_of_active_ads", "operator": "<", "value": 2})),
            &ctx,
        );
        assert!(!eval.passed);
        assert_eq!(eval.actual_value, json!(3));
    }

    #[test]
    fn margin_evaluation_carries_details() {
        let f = Fixture::new(
            json!({"id": "1"}),
            json!({
                "spend": "40",
                "action_values": [{"action_type": "purchase", "value": "100"}]
            }),
        );
        let eval = evaluate(
            &clause(json!({"field": "media_margin_volume", "operator": ">", "value": 50})),
            &f.ctx(),
        );
        assert!(eval.passed);
        assert_eq!(eval.calculation_details.map(|d| d.result), Some(60.0));
    }
}
