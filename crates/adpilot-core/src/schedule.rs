//! Rule schedules.
//!
//! The `schedule` column has held three shapes over time: a bare five-field
//! cron string, a JSON wrapper `{type, cron, timezone}`, and a per-weekday map
//! `{type: "custom_daily", schedule: {"1": "09:00"}, timezone}`. They are all
//! classified into [`Schedule`] on load; [`Schedule::to_stored`] writes the
//! canonical JSON form back.

use std::fmt;

use chrono::{NaiveTime, Timelike};
use chrono_tz::Tz;
use serde_json::{json, Map, Value};
use thiserror::Error;

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("invalid time '{value}' for weekday {weekday}")]
    InvalidTime { weekday: u8, value: String },

    #[error("invalid weekday '{0}' (expected 0 = Sunday through 6 = Saturday)")]
    InvalidWeekday(String),

    #[error("invalid schedule document: {0}")]
    InvalidDocument(String),

    #[error("custom daily schedule has no entries")]
    EmptyCustomSchedule,
}

/// One weekday entry of a custom daily schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyTime {
    /// 0 = Sunday through 6 = Saturday, as in cron.
    pub weekday: u8,
    pub time: NaiveTime,
}

impl DailyTime {
    /// Weekly cron expression firing at this entry's time.
    #[must_use]
    pub fn cron(&self) -> String {
        format!(
            "{} {} * * {}",
            self.time.minute(),
            self.time.hour(),
            self.weekday
        )
    }

    /// Compact `HHMM` form used in trigger identifiers.
    #[must_use]
    pub fn hhmm(&self) -> String {
        format!("{:02}{:02}", self.time.hour(), self.time.minute())
    }

    #[must_use]
    pub fn weekday_name(&self) -> &'static str {
        WEEKDAY_NAMES[usize::from(self.weekday % 7)]
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}",
            self.weekday_name(),
            self.time.hour(),
            self.time.minute()
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    Cron {
        expression: String,
        timezone: Tz,
    },
    CustomDaily {
        entries: Vec<DailyTime>,
        timezone: Tz,
    },
}

impl Schedule {
    /// Builds a validated cron schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::InvalidCron`] unless `expression` is a
    /// parseable five-field cron expression.
    pub fn cron(expression: &str, timezone: Tz) -> Result<Self, ScheduleError> {
        let expression = validate_cron(expression)?;
        Ok(Schedule::Cron {
            expression,
            timezone,
        })
    }

    /// Classifies a stored `schedule` column value.
    ///
    /// Returns `Ok(None)` for an empty value (a manual-only rule).
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleError`] when the value is not one of the known
    /// shapes or carries an invalid cron expression, timezone, or time.
    pub fn parse_stored(raw: &str, default_tz: Tz) -> Result<Option<Self>, ScheduleError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
            return Ok(None);
        }

        if raw.starts_with('{') {
            let doc: Value = serde_json::from_str(raw)
                .map_err(|e| ScheduleError::InvalidDocument(e.to_string()))?;
            return Self::from_value(&doc, default_tz);
        }

        Self::cron(raw, default_tz).map(Some)
    }

    /// Classifies an already-decoded JSON schedule document.
    ///
    /// # Errors
    ///
    /// See [`Schedule::parse_stored`].
    pub fn from_value(doc: &Value, default_tz: Tz) -> Result<Option<Self>, ScheduleError> {
        let obj = match doc {
            Value::Null => return Ok(None),
            Value::String(s) => return Self::parse_stored(s, default_tz),
            Value::Object(obj) => obj,
            other => {
                return Err(ScheduleError::InvalidDocument(format!(
                    "expected an object, got {other}"
                )))
            }
        };

        let timezone = match obj.get("timezone").and_then(Value::as_str).map(str::trim) {
            None | Some("") => default_tz,
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))?,
        };

        match obj.get("type").and_then(Value::as_str).map(str::trim) {
            Some("custom_daily") => {
                let entries = parse_custom_entries(obj)?;
                Ok(Some(Schedule::CustomDaily { entries, timezone }))
            }
            Some("minute" | "hourly" | "daily" | "weekly" | "monthly" | "cron") | None => {
                match obj.get("cron").and_then(Value::as_str).map(str::trim) {
                    Some(expr) if !expr.is_empty() => Self::cron(expr, timezone).map(Some),
                    _ => Ok(None),
                }
            }
            Some(other) => Err(ScheduleError::InvalidDocument(format!(
                "unknown schedule type '{other}'"
            ))),
        }
    }

    #[must_use]
    pub fn timezone(&self) -> Tz {
        match self {
            Schedule::Cron { timezone, .. } | Schedule::CustomDaily { timezone, .. } => *timezone,
        }
    }

    /// Canonical JSON representation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Schedule::Cron {
                expression,
                timezone,
            } => json!({
                "type": "cron",
                "cron": expression,
                "timezone": timezone.name(),
            }),
            Schedule::CustomDaily { entries, timezone } => {
                let schedule: Map<String, Value> = entries
                    .iter()
                    .map(|e| {
                        (
                            e.weekday.to_string(),
                            Value::String(format!("{:02}:{:02}", e.time.hour(), e.time.minute())),
                        )
                    })
                    .collect();
                json!({
                    "type": "custom_daily",
                    "schedule": schedule,
                    "timezone": timezone.name(),
                })
            }
        }
    }

    /// Canonical string written back to the `schedule` column.
    #[must_use]
    pub fn to_stored(&self) -> String {
        self.to_value().to_string()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Cron {
                expression,
                timezone,
            } => write!(f, "cron '{expression}' ({})", timezone.name()),
            Schedule::CustomDaily { entries, timezone } => {
                let parts: Vec<String> = entries.iter().map(ToString::to_string).collect();
                write!(f, "{} ({})", parts.join(", "), timezone.name())
            }
        }
    }
}

fn validate_cron(expression: &str) -> Result<String, ScheduleError> {
    let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    let invalid = |reason: String| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason,
    };

    let fields = normalized.split(' ').filter(|f| !f.is_empty()).count();
    if fields != 5 {
        return Err(invalid(format!("expected 5 fields, found {fields}")));
    }

    croner::Cron::new(&normalized)
        .parse()
        .map_err(|e| invalid(e.to_string()))?;

    Ok(normalized)
}

fn parse_custom_entries(obj: &Map<String, Value>) -> Result<Vec<DailyTime>, ScheduleError> {
    let Some(Value::Object(map)) = obj.get("schedule") else {
        return Err(ScheduleError::InvalidDocument(
            "custom_daily schedule requires a 'schedule' object".to_string(),
        ));
    };

    let mut entries = Vec::with_capacity(map.len());
    for (key, value) in map {
        let weekday = key
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|d| *d <= 6)
            .ok_or_else(|| ScheduleError::InvalidWeekday(key.clone()))?;

        // Days switched off in the editor are stored as empty strings.
        let Some(raw) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };

        let time = parse_clock(raw).ok_or_else(|| ScheduleError::InvalidTime {
            weekday,
            value: raw.to_string(),
        })?;
        entries.push(DailyTime { weekday, time });
    }

    if entries.is_empty() {
        return Err(ScheduleError::EmptyCustomSchedule);
    }
    entries.sort();
    Ok(entries)
}

/// Parses `H:MM` or `HH:MM`.
fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let (hour, minute) = raw.split_once(':')?;
    let hour = hour.trim().parse::<u32>().ok()?;
    let minute = minute.trim().parse::<u32>().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America, UTC};

    #[test]
    fn empty_value_means_manual_only() {
        assert_eq!(Schedule::parse_stored("", UTC).unwrap(), None);
        assert_eq!(Schedule::parse_stored("   ", UTC).unwrap(), None);
    }

    #[test]
    fn bare_cron_uses_default_timezone() {
        let schedule = Schedule::parse_stored("*/15  * * * *", America::Chicago)
            .unwrap()
            .unwrap();
        assert_eq!(
            schedule,
            Schedule::Cron {
                expression: "*/15 * * * *".to_string(),
                timezone: America::Chicago,
            }
        );
    }

    #[test]
    fn wrapped_cron_reads_timezone() {
        let raw = r#"{"type":"daily","cron":"30 9 * * *","timezone":"America/New_York"}"#;
        let schedule = Schedule::parse_stored(raw, UTC).unwrap().unwrap();
        assert_eq!(schedule.timezone(), America::New_York);
        assert!(matches!(schedule, Schedule::Cron { ref expression, .. } if expression == "30 9 * * *"));
    }

    #[test]
    fn untyped_json_with_cron_is_accepted() {
        let raw = r#"{"cron":"0 * * * *"}"#;
        let schedule = Schedule::parse_stored(raw, UTC).unwrap().unwrap();
        assert_eq!(schedule.timezone(), UTC);
    }

    #[test]
    fn custom_daily_entries_are_sorted_and_blank_days_skipped() {
        let raw = r#"{"type":"custom_daily","schedule":{"3":"14:30","1":"9:00","5":""},"timezone":"UTC"}"#;
        let Some(Schedule::CustomDaily { entries, .. }) = Schedule::parse_stored(raw, UTC).unwrap()
        else {
            panic!("expected custom daily schedule");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].weekday, 1);
        assert_eq!(entries[0].hhmm(), "0900");
        assert_eq!(entries[0].cron(), "0 9 * * 1");
        assert_eq!(entries[1].hhmm(), "1430");
    }

    #[test]
    fn custom_daily_rejects_bad_weekday_and_time() {
        let bad_day = r#"{"type":"custom_daily","schedule":{"7":"09:00"}}"#;
        assert!(matches!(
            Schedule::parse_stored(bad_day, UTC),
            Err(ScheduleError::InvalidWeekday(_))
        ));

        let bad_time = r#"{"type":"custom_daily","schedule":{"2":"25:00"}}"#;
        assert!(matches!(
            Schedule::parse_stored(bad_time, UTC),
            Err(ScheduleError::InvalidTime { weekday: 2, .. })
        ));

        let empty = r#"{"type":"custom_daily","schedule":{}}"#;
        assert_eq!(
            Schedule::parse_stored(empty, UTC),
            Err(ScheduleError::EmptyCustomSchedule)
        );
    }

    #[test]
    fn invalid_cron_and_timezone_are_rejected() {
        assert!(matches!(
            Schedule::parse_stored("every day", UTC),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert!(matches!(
            Schedule::parse_stored("0 0 * * * *", UTC),
            Err(ScheduleError::InvalidCron { .. })
        ));
        assert!(matches!(
            Schedule::parse_stored(r#"{"type":"cron","cron":"0 * * * *","timezone":"Nowhere/Land"}"#, UTC),
            Err(ScheduleError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn stored_form_is_canonical_and_reparses() {
        let legacy = "0 */2 * * *";
        let schedule = Schedule::parse_stored(legacy, UTC).unwrap().unwrap();
        let stored = schedule.to_stored();
        assert!(stored.contains(r#""type":"cron""#));
        assert_eq!(Schedule::parse_stored(&stored, UTC).unwrap(), Some(schedule));
    }
}
