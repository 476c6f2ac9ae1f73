//! Quota usage tracking from the platform's usage headers.
//!
//! Every response carries some of `X-App-Usage`, `X-Ad-Account-Usage`, and
//! `X-Business-Use-Case-Usage`. The tracker keeps a short history per ad
//! account so consecutive readings can be turned into a consumption rate and
//! an estimate of when the account will hit its limit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

pub const USAGE_HEADERS: [&str; 3] = [
    "x-app-usage",
    "x-ad-account-usage",
    "x-business-use-case-usage",
];

const WARN_PCT: f64 = 80.0;
const CRITICAL_PCT: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Read,
    Write,
    Insights,
}

impl CallKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Read => "read",
            CallKind::Write => "write",
            CallKind::Insights => "insights",
        }
    }
}

/// Metrics reported under one usage header (or one business-use-case entry).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageMetrics {
    pub call_count: f64,
    pub total_time: f64,
    pub total_cputime: f64,
    pub acc_id_util_pct: Option<f64>,
    pub reset_time_duration: Option<f64>,
    pub ads_api_access_tier: Option<String>,
}

impl UsageMetrics {
    fn from_object(obj: &serde_json::Map<String, Value>) -> Self {
        let num = |key: &str| obj.get(key).and_then(Value::as_f64);
        Self {
            call_count: num("call_count").unwrap_or(0.0),
            total_time: num("total_time").unwrap_or(0.0),
            total_cputime: num("total_cputime").unwrap_or(0.0),
            acc_id_util_pct: num("acc_id_util_pct"),
            reset_time_duration: num("reset_time_duration"),
            ads_api_access_tier: obj
                .get("ads_api_access_tier")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageLevel {
    Normal,
    Warning(String),
    Critical(String),
}

/// One response's worth of readings, keyed by header name. Business use case
/// entries are keyed `"x-business-use-case-usage/<business id>"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub readings: Vec<(String, UsageMetrics)>,
}

impl UsageSnapshot {
    /// Parses the usage headers; headers with malformed JSON are skipped.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut readings = Vec::new();
        for name in USAGE_HEADERS {
            let Some(raw) = headers.get(name).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) else {
                tracing::debug!(header = name, raw, "unparseable usage header");
                continue;
            };

            if name == "x-business-use-case-usage" {
                for (business, entries) in &obj {
                    let Some(entries) = entries.as_array() else {
                        continue;
                    };
                    for entry in entries.iter().filter_map(Value::as_object) {
                        readings.push((
                            format!("{name}/{business}"),
                            UsageMetrics::from_object(entry),
                        ));
                    }
                }
            } else {
                readings.push((name.to_string(), UsageMetrics::from_object(&obj)));
            }
        }
        Self { readings }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    fn get(&self, key: &str) -> Option<&UsageMetrics> {
        self.readings
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, m)| m)
    }

    /// Highest severity across all readings. Each of `acc_id_util_pct`,
    /// `call_count` and `total_time` is graded on its own, so a warning on one
    /// never hides a critical value on another.
    #[must_use]
    pub fn level(&self) -> UsageLevel {
        let mut warnings = Vec::new();
        let mut critical = Vec::new();

        for (name, m) in &self.readings {
            let figures = [
                ("acc_id_util_pct", m.acc_id_util_pct, "%"),
                ("call_count", Some(m.call_count), ""),
                ("total_time", Some(m.total_time), ""),
            ];
            for (metric, value, suffix) in figures {
                match value {
                    Some(v) if v >= CRITICAL_PCT => {
                        critical.push(format!("{name}: {metric}={v}{suffix}"));
                    }
                    Some(v) if v >= WARN_PCT => {
                        warnings.push(format!("{name}: {metric}={v}{suffix}"));
                    }
                    _ => {}
                }
            }
        }

        if !critical.is_empty() {
            critical.extend(warnings);
            UsageLevel::Critical(critical.join("; "))
        } else if !warnings.is_empty() {
            UsageLevel::Warning(warnings.join("; "))
        } else {
            UsageLevel::Normal
        }
    }
}

/// Rate of change between the two most recent readings of one header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageTrend {
    pub header: String,
    pub elapsed_secs: f64,
    pub calls_per_sec: Option<f64>,
    pub pct_per_sec: Option<f64>,
    /// Seconds until utilisation reaches 100 % at the current rate.
    pub secs_to_limit: Option<f64>,
}

#[derive(Debug, Clone)]
struct Reading {
    at: Instant,
    snapshot: UsageSnapshot,
}

/// Bounded per-account usage history. Shared by every client call.
#[derive(Debug)]
pub struct UsageTracker {
    capacity: usize,
    history: Mutex<HashMap<String, VecDeque<Reading>>>,
}

impl UsageTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Parses, logs, and records the usage headers of one response.
    pub fn observe(&self, account: &str, kind: CallKind, headers: &HeaderMap) -> Vec<UsageTrend> {
        let snapshot = UsageSnapshot::from_headers(headers);
        if snapshot.is_empty() {
            return Vec::new();
        }

        match snapshot.level() {
            UsageLevel::Critical(detail) => {
                tracing::error!(account, call = kind.as_str(), %detail, "critical API usage");
            }
            UsageLevel::Warning(detail) => {
                tracing::warn!(account, call = kind.as_str(), %detail, "high API usage");
            }
            UsageLevel::Normal => {
                tracing::debug!(account, call = kind.as_str(), readings = snapshot.readings.len(), "API usage");
            }
        }

        let trends = self.record(account, snapshot, Instant::now());
        for trend in &trends {
            tracing::info!(
                account,
                header = %trend.header,
                elapsed_secs = trend.elapsed_secs,
                calls_per_sec = ?trend.calls_per_sec,
                pct_per_sec = ?trend.pct_per_sec,
                "API usage trend"
            );
            if let Some(secs) = trend.secs_to_limit {
                tracing::warn!(
                    account,
                    header = %trend.header,
                    secs_to_limit = secs,
                    "API usage will reach 100% at the current rate"
                );
            }
        }
        trends
    }

    /// Appends a reading and returns trends against the previous one.
    pub fn record(&self, account: &str, snapshot: UsageSnapshot, at: Instant) -> Vec<UsageTrend> {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let readings = history.entry(account.to_string()).or_default();
        readings.push_back(Reading { at, snapshot });
        while readings.len() > self.capacity {
            readings.pop_front();
        }

        let mut latest_two = readings.iter().rev();
        let (Some(current), Some(previous)) = (latest_two.next(), latest_two.next()) else {
            return Vec::new();
        };
        trends_between(previous, current)
    }

    /// Number of readings held for `account`.
    #[must_use]
    pub fn history_len(&self, account: &str) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .map_or(0, VecDeque::len)
    }

    /// Most recent snapshot for `account`.
    #[must_use]
    pub fn latest(&self, account: &str) -> Option<UsageSnapshot> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(account)
            .and_then(VecDeque::back)
            .map(|r| r.snapshot.clone())
    }
}

fn trends_between(previous: &Reading, current: &Reading) -> Vec<UsageTrend> {
    let elapsed = current.at.saturating_duration_since(previous.at).as_secs_f64();
    if elapsed <= 0.0 {
        return Vec::new();
    }

    current
        .snapshot
        .readings
        .iter()
        .filter_map(|(header, now)| {
            let before = previous.snapshot.get(header)?;

            let calls_per_sec = (now.call_count > before.call_count)
                .then(|| (now.call_count - before.call_count) / elapsed);

            let (pct_per_sec, secs_to_limit) = match (before.acc_id_util_pct, now.acc_id_util_pct) {
                (Some(p0), Some(p1)) => {
                    let rate = (p1 - p0) / elapsed;
                    let eta = (rate > 0.0 && p1 < 100.0).then(|| (100.0 - p1) / rate);
                    (Some(rate), eta)
                }
                _ => (None, None),
            };

            Some(UsageTrend {
                header: header.clone(),
                elapsed_secs: elapsed,
                calls_per_sec,
                pct_per_sec,
                secs_to_limit,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn parses_flat_and_business_headers() {
        let snapshot = UsageSnapshot::from_headers(&headers(&[
            ("x-app-usage", r#"{"call_count":12,"total_time":3,"total_cputime":1}"#),
            (
                "x-business-use-case-usage",
                r#"{"999":[{"type":"ads_management","call_count":40,"total_time":5}]}"#,
            ),
        ]));
        assert_eq!(snapshot.readings.len(), 2);
        assert_eq!(snapshot.readings[0].0, "x-app-usage");
        assert_eq!(snapshot.readings[1].0, "x-business-use-case-usage/999");
        assert_eq!(snapshot.level(), UsageLevel::Normal);
    }

    #[test]
    fn utilisation_thresholds() {
        let warn = UsageSnapshot::from_headers(&headers(&[(
            "x-ad-account-usage",
            r#"{"acc_id_util_pct":85}"#,
        )]));
        assert!(matches!(warn.level(), UsageLevel::Warning(_)));

        let critical = UsageSnapshot::from_headers(&headers(&[(
            "x-ad-account-usage",
            r#"{"acc_id_util_pct":90}"#,
        )]));
        assert!(matches!(critical.level(), UsageLevel::Critical(_)));

        let busy = UsageSnapshot::from_headers(&headers(&[(
            "x-app-usage",
            r#"{"call_count":81,"total_time":2}"#,
        )]));
        assert!(matches!(busy.level(), UsageLevel::Warning(_)));
    }

    #[test]
    fn every_figure_is_graded_independently() {
        let snapshot = UsageSnapshot::from_headers(&headers(&[(
            "x-ad-account-usage",
            r#"{"acc_id_util_pct":85,"call_count":95,"total_time":10}"#,
        )]));
        let UsageLevel::Critical(detail) = snapshot.level() else {
            panic!("expected critical usage");
        };
        assert!(detail.contains("call_count=95"));
        assert!(detail.contains("acc_id_util_pct=85%"));

        let slow = UsageSnapshot::from_headers(&headers(&[(
            "x-app-usage",
            r#"{"call_count":82,"total_time":91}"#,
        )]));
        assert!(matches!(slow.level(), UsageLevel::Critical(_)));
    }

    #[test]
    fn malformed_header_is_ignored() {
        let snapshot = UsageSnapshot::from_headers(&headers(&[("x-app-usage", "not json")]));
        assert!(snapshot.is_empty());
    }

    #[test]
    fn trend_estimates_time_to_limit() {
        let tracker = UsageTracker::new(10);
        let start = Instant::now();

        let first = UsageSnapshot::from_headers(&headers(&[(
            "x-ad-account-usage",
            r#"{"acc_id_util_pct":50}"#,
        )]));
        assert!(tracker.record("act_1", first, start).is_empty());

        let second = UsageSnapshot::from_headers(&headers(&[(
            "x-ad-account-usage",
            r#"{"acc_id_util_pct":60}"#,
        )]));
        let trends = tracker.record("act_1", second, start + Duration::from_secs(10));
        assert_eq!(trends.len(), 1);
        let pct = trends[0].pct_per_sec.unwrap();
        assert!((pct - 1.0).abs() < 1e-9);
        let eta = trends[0].secs_to_limit.unwrap();
        assert!((eta - 40.0).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded_per_account() {
        let tracker = UsageTracker::new(3);
        let start = Instant::now();
        for i in 0..5u64 {
            let snapshot = UsageSnapshot::from_headers(&headers(&[(
                "x-app-usage",
                r#"{"call_count":1}"#,
            )]));
            tracker.record("act_1", snapshot, start + Duration::from_secs(i));
        }
        assert_eq!(tracker.history_len("act_1"), 3);
        assert_eq!(tracker.history_len("act_2"), 0);
        assert!(tracker.latest("act_1").is_some());
    }
}
