//! Pure trigger planning: ids, next fire times, and repeat intervals.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;
use serde::Serialize;

use adpilot_core::{DailyTime, Schedule};

use super::SchedulerError;

/// Repeat interval of a custom-daily entry: once a week.
pub const WEEKLY_INTERVAL_SECS: u64 = 7 * 24 * 3600;

/// Used when the interval cannot be derived from the expression.
pub const FALLBACK_INTERVAL_SECS: u64 = 60;

/// One trigger to register with the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerPlan {
    pub id: String,
    pub rule_id: i64,
    /// Five-field cron expression evaluated in `timezone`.
    pub cron: String,
    pub timezone: Tz,
    pub next_fire: DateTime<Utc>,
    pub repeat_interval_secs: u64,
}

#[must_use]
pub fn trigger_id(rule_id: i64) -> String {
    format!("rule_{rule_id}")
}

#[must_use]
pub fn weekday_trigger_id(rule_id: i64, entry: &DailyTime) -> String {
    format!("rule_{rule_id}_day{}_{}", entry.weekday, entry.hhmm())
}

/// Whether `id` is the primary trigger of `rule_id` or one of its weekday
/// variants. `rule_1` does not claim `rule_12`.
#[must_use]
pub fn belongs_to_rule(id: &str, rule_id: i64) -> bool {
    let base = trigger_id(rule_id);
    match id.strip_prefix(&base) {
        Some("") => true,
        Some(rest) => rest.starts_with("_day"),
        None => false,
    }
}

fn parse(expression: &str) -> Result<Cron, SchedulerError> {
    Cron::new(expression)
        .parse()
        .map_err(|e| SchedulerError::InvalidCron {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

/// First fire strictly after `after`, computed on the wall clock of `tz`.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidCron`] for an unparseable expression and
/// [`SchedulerError::NoUpcomingFire`] when the expression never fires again.
pub fn next_fire(
    expression: &str,
    tz: Tz,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    let cron = parse(expression)?;
    next_after(&cron, expression, tz, after)
}

fn next_after(
    cron: &Cron,
    expression: &str,
    tz: Tz,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    cron.find_next_occurrence(&after.with_timezone(&tz), false)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| SchedulerError::NoUpcomingFire(expression.to_string()))
}

fn step(field: &str) -> Option<u64> {
    field.strip_prefix("*/").and_then(|n| n.parse().ok())
}

/// Approximate repeat interval of a cron expression.
///
/// Step patterns (`*/N`) on minute, hour, or day-of-month map directly. A
/// fixed minute with every hour is hourly. Anything else uses the gap between
/// the next two fires after `now`.
#[must_use]
pub fn repeat_interval_secs(expression: &str, tz: Tz, now: DateTime<Utc>) -> u64 {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if let [minute, hour, day, _month, _weekday] = fields.as_slice() {
        if let Some(n) = step(minute) {
            return n * 60;
        }
        if *minute != "*" && *hour == "*" {
            return 3600;
        }
        if let Some(n) = step(hour) {
            return n * 3600;
        }
        if let Some(n) = step(day) {
            return n * 86_400;
        }
    }

    let gap = parse(expression).and_then(|cron| {
        let first = next_after(&cron, expression, tz, now)?;
        let second = next_after(&cron, expression, tz, first)?;
        Ok((second - first).num_seconds())
    });
    match gap {
        Ok(secs) if secs > 0 => secs.unsigned_abs(),
        _ => {
            tracing::warn!(expression, "could not derive repeat interval; using fallback");
            FALLBACK_INTERVAL_SECS
        }
    }
}

/// Triggers for `schedule`: one for a cron schedule, one per weekday entry
/// for a custom-daily schedule.
///
/// # Errors
///
/// Returns the first [`SchedulerError`] from computing a next fire time.
pub fn plan(
    rule_id: i64,
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> Result<Vec<TriggerPlan>, SchedulerError> {
    match schedule {
        Schedule::Cron {
            expression,
            timezone,
        } => Ok(vec![TriggerPlan {
            id: trigger_id(rule_id),
            rule_id,
            cron: expression.clone(),
            timezone: *timezone,
            next_fire: next_fire(expression, *timezone, now)?,
            repeat_interval_secs: repeat_interval_secs(expression, *timezone, now),
        }]),
        Schedule::CustomDaily { entries, timezone } => entries
            .iter()
            .map(|entry| {
                let cron = entry.cron();
                Ok(TriggerPlan {
                    id: weekday_trigger_id(rule_id, entry),
                    rule_id,
                    next_fire: next_fire(&cron, *timezone, now)?,
                    cron,
                    timezone: *timezone,
                    repeat_interval_secs: WEEKLY_INTERVAL_SECS,
                })
            })
            .collect(),
    }
}

/// The value stored as a rule's `next_run_at`.
#[must_use]
pub fn earliest(plans: &[TriggerPlan]) -> Option<DateTime<Utc>> {
    plans.iter().map(|p| p.next_fire).min()
}

/// The next `count` fire times of `schedule` after `after`, across all of its
/// triggers.
///
/// # Errors
///
/// Returns [`SchedulerError`] if any expression fails to parse.
pub fn next_runs(
    schedule: &Schedule,
    after: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Utc>>, SchedulerError> {
    let (expressions, tz): (Vec<String>, Tz) = match schedule {
        Schedule::Cron {
            expression,
            timezone,
        } => (vec![expression.clone()], *timezone),
        Schedule::CustomDaily { entries, timezone } => {
            (entries.iter().map(DailyTime::cron).collect(), *timezone)
        }
    };

    let mut fires = Vec::with_capacity(count * expressions.len());
    for expression in &expressions {
        let cron = parse(expression)?;
        let mut cursor = after;
        for _ in 0..count {
            match next_after(&cron, expression, tz, cursor) {
                Ok(fire) => {
                    fires.push(fire);
                    cursor = fire;
                }
                Err(_) => break,
            }
        }
    }

    fires.sort();
    fires.dedup();
    fires.truncate(count);
    Ok(fires)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn custom_daily() -> Schedule {
        Schedule::from_value(
            &json!({
                "type": "custom_daily",
                "schedule": {"1": "09:00", "3": "14:30"},
                "timezone": "America/New_York"
            }),
            Tz::UTC,
        )
        .unwrap()
        .unwrap()
    }

    #[test]
    fn trigger_ids_are_deterministic() {
        let entry = DailyTime {
            weekday: 3,
            time: chrono::NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
        };
        assert_eq!(trigger_id(42), "rule_42");
        assert_eq!(weekday_trigger_id(42, &entry), "rule_42_day3_1430");
    }

    #[test]
    fn prefix_match_does_not_cross_rules() {
        assert!(belongs_to_rule("rule_1", 1));
        assert!(belongs_to_rule("rule_1_day1_0900", 1));
        assert!(!belongs_to_rule("rule_12", 1));
        assert!(!belongs_to_rule("rule_12_day1_0900", 1));
    }

    #[test]
    fn custom_daily_plans_one_trigger_per_weekday() {
        // Monday 2026-03-02 07:00 in New York (UTC-5).
        let now = at(2026, 3, 2, 12, 0);
        let plans = plan(5, &custom_daily(), now).unwrap();

        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].id, "rule_5_day1_0900");
        assert_eq!(plans[0].next_fire, at(2026, 3, 2, 14, 0));
        assert_eq!(plans[1].id, "rule_5_day3_1430");
        assert_eq!(plans[1].next_fire, at(2026, 3, 4, 19, 30));
        assert!(plans.iter().all(|p| p.repeat_interval_secs == WEEKLY_INTERVAL_SECS));

        assert_eq!(earliest(&plans), Some(at(2026, 3, 2, 14, 0)));
    }

    #[test]
    fn cron_next_fire_honours_timezone() {
        let next = next_fire("0 9 * * *", chrono_tz::Europe::Berlin, at(2026, 7, 1, 8, 0)).unwrap();
        // 09:00 CEST is 07:00 UTC, already past, so the next day.
        assert_eq!(next, at(2026, 7, 2, 7, 0));
    }

    #[test]
    fn repeat_intervals() {
        let now = at(2026, 3, 2, 12, 0);
        assert_eq!(repeat_interval_secs("*/15 * * * *", Tz::UTC, now), 900);
        assert_eq!(repeat_interval_secs("30 * * * *", Tz::UTC, now), 3600);
        assert_eq!(repeat_interval_secs("0 */6 * * *", Tz::UTC, now), 21_600);
        assert_eq!(repeat_interval_secs("0 0 */2 * *", Tz::UTC, now), 172_800);
        assert_eq!(repeat_interval_secs("0 9 * * *", Tz::UTC, now), 86_400);
        assert_eq!(repeat_interval_secs("0 9 * * 1", Tz::UTC, now), 604_800);
    }

    #[test]
    fn next_runs_merge_entries_in_order() {
        let runs = next_runs(&custom_daily(), at(2026, 3, 2, 12, 0), 3).unwrap();
        assert_eq!(
            runs,
            vec![
                at(2026, 3, 2, 14, 0),
                at(2026, 3, 4, 19, 30),
                // DST starts 2026-03-08 in New York: 09:00 EDT is 13:00 UTC.
                at(2026, 3, 9, 13, 0),
            ]
        );
    }

    #[test]
    fn invalid_expression_is_reported() {
        let err = next_fire("61 * * * *", Tz::UTC, at(2026, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidCron { .. }));
    }
}
