//! Converts rule time windows into the inclusive `since`/`until` dates the
//! insights endpoint accepts.

use adpilot_core::{TimeRange, TimeUnit};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

impl DateRange {
    /// Resolves `range` relative to `now` (account-local wall clock).
    ///
    /// Both ends are inclusive, so `N` days starts `N - 1` days before the
    /// end date. With `exclude_today` on a day window the end moves to the
    /// last second of yesterday. A window reaching past the earliest
    /// representable date is clamped to it.
    #[must_use]
    pub fn resolve(range: &TimeRange, now: NaiveDateTime) -> Self {
        if range.unit == TimeUnit::Today {
            let today = now.date();
            return Self {
                since: today,
                until: today,
            };
        }

        let end = if range.unit == TimeUnit::Days && range.exclude_today {
            let yesterday = now.date() - Duration::days(1);
            yesterday.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default())
        } else {
            now
        };

        let amount = i64::from(range.amount.max(1));
        let span = match range.unit {
            TimeUnit::Minutes => Duration::try_minutes(amount),
            TimeUnit::Hours => Duration::try_hours(amount),
            TimeUnit::Days | TimeUnit::Today => Duration::try_days(amount - 1),
        };
        let start = span
            .and_then(|span| end.checked_sub_signed(span))
            .unwrap_or(NaiveDateTime::MIN);

        Self {
            since: start.date(),
            until: end.date(),
        }
    }

    /// The `time_range` query parameter value.
    #[must_use]
    pub fn to_param(&self) -> String {
        json!({
            "since": self.since.format("%Y-%m-%d").to_string(),
            "until": self.until.format("%Y-%m-%d").to_string(),
        })
        .to_string()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.since, self.until)
    }
}
