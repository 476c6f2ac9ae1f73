//! Per-item signals that need more than the aggregate insight row.

use adpilot_core::Level;
use adpilot_meta::{AdObject, Insight};
use serde::Serialize;

use crate::metrics;

/// One calendar day of a winning-days computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WinningDay {
    pub date: String,
    pub cpp: f64,
    pub spend: f64,
    pub purchase_count: f64,
    pub is_winning: bool,
}

/// Days in a window on which the item bought at a CPP below a threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WinningDays {
    pub wins: usize,
    pub days: Vec<WinningDay>,
}

impl WinningDays {
    /// Days without purchases never win, however low their cost.
    #[must_use]
    pub fn compute(daily: &[Insight], threshold: f64) -> Self {
        let days: Vec<WinningDay> = daily
            .iter()
            .map(|row| {
                let purchase_count = metrics::purchase_count(row);
                let cpp = metrics::cpp(row);
                WinningDay {
                    date: row.date_start().unwrap_or("unknown").to_string(),
                    cpp,
                    spend: row.spend(),
                    purchase_count,
                    is_winning: purchase_count > 0.0 && cpp < threshold,
                }
            })
            .collect();
        let wins = days.iter().filter(|d| d.is_winning).count();
        Self { wins, days }
    }

    #[must_use]
    pub fn total_days(&self) -> usize {
        self.days.len()
    }
}

/// The object whose ads are counted for `amount_of_active_ads`: the item
/// itself for campaigns and ad sets, the parent ad set for ads.
#[must_use]
pub fn active_ads_parent(level: Level, item: &AdObject) -> Option<&str> {
    match level {
        Level::Campaign | Level::AdSet => Some(item.id()).filter(|id| !id.is_empty()),
        Level::Ad => item.adset_id(),
    }
}

/// Ads for which [`AdObject::is_active`] holds.
#[must_use]
pub fn count_active_ads(ads: &[AdObject]) -> usize {
    ads.iter().filter(|ad| ad.is_active()).count()
}
