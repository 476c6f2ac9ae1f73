use std::collections::HashMap;

use adpilot_core::Level;
use serde_json::{json, Value};

use super::MetaClient;
use crate::error::MetaError;
use crate::filter::{object_fields, page_limit, ObjectFilter, CHILD_AD_FIELDS};
use crate::types::{AdObject, Credentials};
use crate::usage::CallKind;

/// Ids per campaign-status lookup.
const STATUS_BATCH_SIZE: usize = 50;

/// Children fetched per page when counting a parent's ads.
const CHILD_AD_LIMIT: &str = "5000";

fn into_objects(values: Vec<Value>) -> Vec<AdObject> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(AdObject(map)),
            _ => None,
        })
        .collect()
}

impl MetaClient {
    /// Fetches every non-archived, non-deleted object at `level`, following
    /// pagination and pushing `filter` to the server.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::RateLimited`] when the platform throttles, or any
    /// other [`MetaError`] for a failed page. A failure on any page fails the
    /// whole fetch; partial collections are never returned.
    pub async fn fetch_objects(
        &self,
        creds: &Credentials,
        level: Level,
        filter: &ObjectFilter,
    ) -> Result<Vec<AdObject>, MetaError> {
        let filtering = filter.to_param(level);
        let limit = page_limit(level).to_string();
        let url = self.endpoint(
            &format!("{}/{}", creds.account_id(), level.edge()),
            &[
                ("fields", object_fields(level)),
                ("limit", &limit),
                ("filtering", &filtering),
            ],
        )?;

        let context = format!("{} {}", creds.account_id(), level.edge());
        tracing::info!(
            account = creds.account_id(),
            level = level.as_str(),
            statuses = ?filter.statuses,
            campaign_filter = filter.campaign_ids.len(),
            "fetching objects"
        );
        let values = self
            .paginate(creds, CallKind::Read, url, Some(&filtering), &context)
            .await?;
        let objects = into_objects(values);
        tracing::info!(
            account = creds.account_id(),
            level = level.as_str(),
            count = objects.len(),
            "fetched objects"
        );
        Ok(objects)
    }

    /// Every non-archived campaign of the account. Used to resolve campaign
    /// names for scope filtering at ad and ad-set level.
    ///
    /// # Errors
    ///
    /// See [`MetaClient::fetch_objects`].
    pub async fn fetch_campaigns(&self, creds: &Credentials) -> Result<Vec<AdObject>, MetaError> {
        self.fetch_objects(creds, Level::Campaign, &ObjectFilter::default())
            .await
    }

    /// Status of each campaign in `campaign_ids`, keyed by campaign id.
    ///
    /// The configured status wins over the effective status. Campaigns the
    /// platform does not return are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns the first failed batch's error. Batches that completed before
    /// the failure are discarded with it.
    pub async fn fetch_campaign_statuses(
        &self,
        creds: &Credentials,
        campaign_ids: &[String],
    ) -> Result<HashMap<String, String>, MetaError> {
        let mut statuses = HashMap::new();
        let batch_limit = STATUS_BATCH_SIZE.to_string();
        let batches: Vec<&[String]> = campaign_ids.chunks(STATUS_BATCH_SIZE).collect();

        for (index, batch) in batches.iter().enumerate() {
            if index > 0 {
                self.pause(CallKind::Read).await;
            }
            let filtering = json!([{"field": "id", "operator": "IN", "value": batch}]).to_string();
            let url = self.endpoint(
                &format!("{}/campaigns", creds.account_id()),
                &[
                    ("fields", "id,status,effective_status"),
                    ("filtering", &filtering),
                    ("limit", &batch_limit),
                ],
            )?;
            let values = self
                .paginate(creds, CallKind::Read, url, Some(&filtering), "campaign statuses")
                .await?;
            for campaign in into_objects(values) {
                if let Some(status) = campaign.display_status() {
                    statuses.insert(campaign.id().to_string(), status.to_string());
                }
            }
        }

        Ok(statuses)
    }

    /// Ads directly under a campaign or ad set.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] for any failed page.
    pub async fn fetch_child_ads(
        &self,
        creds: &Credentials,
        parent_id: &str,
    ) -> Result<Vec<AdObject>, MetaError> {
        let url = self.endpoint(
            &format!("{parent_id}/ads"),
            &[("fields", CHILD_AD_FIELDS), ("limit", CHILD_AD_LIMIT)],
        )?;
        let context = format!("ads of {parent_id}");
        let values = self
            .paginate(creds, CallKind::Read, url, None, &context)
            .await?;
        Ok(into_objects(values))
    }
}
