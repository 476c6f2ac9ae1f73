//! Buckets clauses by effective time range so each window is fetched once.

use adpilot_core::{ConditionClause, TimeRange};
use serde::Serialize;

/// Clauses sharing one insights window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeRangeGroup {
    pub time_range: TimeRange,
    /// Indices into the rule's clause list.
    pub clauses: Vec<usize>,
    /// Some clause reads the aggregate row for this window.
    pub needs_insights: bool,
    /// Some clause needs one row per day for this window.
    pub needs_daily: bool,
}

/// Groups clauses by `clause.time_range.unwrap_or(default)`, in order of
/// first appearance.
#[must_use]
pub fn group_by_time_range(clauses: &[ConditionClause], default: TimeRange) -> Vec<TimeRangeGroup> {
    let mut groups: Vec<TimeRangeGroup> = Vec::new();

    for (index, clause) in clauses.iter().enumerate() {
        let range = clause.effective_time_range(default);
        let position = match groups.iter().position(|g| g.time_range == range) {
            Some(position) => position,
            None => {
                groups.push(TimeRangeGroup {
                    time_range: range,
                    clauses: Vec::new(),
                    needs_insights: false,
                    needs_daily: false,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[position];
        group.clauses.push(index);
        group.needs_insights |= clause.needs_insights();
        group.needs_daily |= clause.needs_daily_insights();
    }

    groups
}

#[cfg(test)]
mod tests {
    use adpilot_core::TimeUnit;
    use serde_json::json;

    use super::*;

    fn clauses(docs: serde_json::Value) -> Vec<ConditionClause> {
        docs.as_array()
            .unwrap()
            .iter()
            .map(|d| ConditionClause::from_value(d).unwrap())
            .collect()
    }

    #[test]
    fn clauses_without_override_share_the_default_window() {
        let list = clauses(json!([
            {"field": "spend", "operator": ">", "value": 100},
            {"field": "status", "operator": "=", "value": "ACTIVE"},
            {"field": "cpp", "operator": "<", "value": 30,
             "time_range": {"unit": "days", "amount": 7}},
            {"field": "cpp_winning_days", "operator": ">=", "value": 3, "threshold": 25,
             "time_range": {"unit": "days", "amount": 7}}
        ]));

        let groups = group_by_time_range(&list, TimeRange::default());
        assert_eq!(groups.len(), 2);

        assert_eq!(groups[0].time_range, TimeRange::default());
        assert_eq!(groups[0].clauses, vec![0, 1]);
        assert!(groups[0].needs_insights);
        assert!(!groups[0].needs_daily);

        assert_eq!(groups[1].time_range.amount, 7);
        assert_eq!(groups[1].time_range.unit, TimeUnit::Days);
        assert_eq!(groups[1].clauses, vec![2, 3]);
        assert!(groups[1].needs_daily);
    }

    #[test]
    fn object_only_clauses_need_no_insights() {
        let list = clauses(json!([
            {"field": "status", "operator": "=", "value": "ACTIVE"},
            {"field": "daily_budget", "operator": ">", "value": 10}
        ]));
        let groups = group_by_time_range(&list, TimeRange::default());
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].needs_insights);
    }
}
