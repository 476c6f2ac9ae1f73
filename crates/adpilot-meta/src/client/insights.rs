use std::collections::HashMap;

use adpilot_core::Level;

use super::MetaClient;
use crate::error::MetaError;
use crate::filter::{insights_filter, DAILY_INSIGHT_FIELDS, INSIGHT_FIELDS};
use crate::time_range::DateRange;
use crate::types::{Credentials, Insight};
use crate::usage::CallKind;

/// Object ids per insights request.
pub const INSIGHTS_BATCH_SIZE: usize = 50;

impl MetaClient {
    /// Aggregated insights for `ids` over `range`, one row per object.
    ///
    /// Every requested id is present in the result; objects the platform
    /// returned no row for map to an empty [`Insight`].
    ///
    /// # Errors
    ///
    /// Returns the first failed batch's error. The run has nothing sound to
    /// evaluate against once a batch is missing, so no partial map is returned.
    pub async fn fetch_insights(
        &self,
        creds: &Credentials,
        level: Level,
        ids: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, Insight>, MetaError> {
        let rows = self
            .insight_rows(creds, level, ids, range, INSIGHT_FIELDS, false)
            .await?;

        let mut by_id: HashMap<String, Insight> = HashMap::with_capacity(ids.len());
        for row in rows {
            if let Some(id) = row.object_id(level.id_key()).map(ToOwned::to_owned) {
                by_id.insert(id, row);
            }
        }
        for id in ids {
            by_id.entry(id.clone()).or_default();
        }
        Ok(by_id)
    }

    /// One insight row per object per calendar day in `range`.
    ///
    /// Objects without any row map to an empty list. Rows are ordered by date.
    ///
    /// # Errors
    ///
    /// See [`MetaClient::fetch_insights`].
    pub async fn fetch_daily_insights(
        &self,
        creds: &Credentials,
        level: Level,
        ids: &[String],
        range: DateRange,
    ) -> Result<HashMap<String, Vec<Insight>>, MetaError> {
        let rows = self
            .insight_rows(creds, level, ids, range, DAILY_INSIGHT_FIELDS, true)
            .await?;

        let mut by_id: HashMap<String, Vec<Insight>> = ids
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        for row in rows {
            if let Some(id) = row.object_id(level.id_key()).map(ToOwned::to_owned) {
                by_id.entry(id).or_default().push(row);
            }
        }
        for days in by_id.values_mut() {
            days.sort_by(|a, b| a.date_start().cmp(&b.date_start()));
        }
        Ok(by_id)
    }

    async fn insight_rows(
        &self,
        creds: &Credentials,
        level: Level,
        ids: &[String],
        range: DateRange,
        fields: &str,
        daily: bool,
    ) -> Result<Vec<Insight>, MetaError> {
        let mut rows = Vec::new();
        if ids.is_empty() {
            return Ok(rows);
        }

        let time_range = range.to_param();
        let batches: Vec<&[String]> = ids.chunks(INSIGHTS_BATCH_SIZE).collect();
        let total = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            if index > 0 {
                self.pause(CallKind::Insights).await;
            }

            let filtering = insights_filter(level, batch);
            let mut query = vec![
                ("level", level.insights_level()),
                ("fields", fields),
                ("time_range", time_range.as_str()),
                ("filtering", filtering.as_str()),
                ("action_breakdowns", "action_type"),
            ];
            if daily {
                query.push(("time_increment", "1"));
            }
            let url = self.endpoint(&format!("{}/insights", creds.account_id()), &query)?;

            let context = format!(
                "insights batch {}/{total} ({} ids, {range})",
                index + 1,
                batch.len()
            );
            let values = self
                .paginate(creds, CallKind::Insights, url, Some(&filtering), &context)
                .await?;
            tracing::info!(
                account = creds.account_id(),
                level = level.insights_level(),
                batch = index + 1,
                total,
                ids = batch.len(),
                rows = values.len(),
                daily,
                "fetched insights batch"
            );
            rows.extend(values.into_iter().filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(Insight(map)),
                _ => None,
            }));
        }

        Ok(rows)
    }
}
