use serde_json::Value;

use super::MetaClient;
use crate::error::MetaError;
use crate::types::{AdObject, Credentials};
use crate::usage::CallKind;

impl MetaClient {
    /// Current daily budget of an ad set, in minor currency units.
    /// An ad set without a daily budget reads as 0.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] if the read fails.
    pub async fn get_daily_budget_cents(
        &self,
        creds: &Credentials,
        adset_id: &str,
    ) -> Result<f64, MetaError> {
        let url = self.endpoint(adset_id, &[("fields", "daily_budget")])?;
        let object: AdObject = self
            .get_json(creds, CallKind::Read, url, &format!("budget of {adset_id}"))
            .await?;
        Ok(object.daily_budget_cents().unwrap_or(0.0))
    }

    /// Sets the configured status of a campaign, ad set, or ad.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] if the platform rejects the update.
    pub async fn set_status(
        &self,
        creds: &Credentials,
        object_id: &str,
        status: &str,
    ) -> Result<(), MetaError> {
        let url = self.endpoint(object_id, &[])?;
        let _: Value = self
            .post_form(
                creds,
                url,
                &[("status", status)],
                &format!("set status of {object_id}"),
            )
            .await?;
        tracing::info!(account = creds.account_id(), object_id, status, "status updated");
        Ok(())
    }

    /// Replaces an ad set's daily budget. `cents` is in minor currency units.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError`] if the platform rejects the update.
    pub async fn set_daily_budget(
        &self,
        creds: &Credentials,
        adset_id: &str,
        cents: i64,
    ) -> Result<(), MetaError> {
        let url = self.endpoint(adset_id, &[])?;
        let value = cents.to_string();
        let _: Value = self
            .post_form(
                creds,
                url,
                &[("daily_budget", value.as_str())],
                &format!("set budget of {adset_id}"),
            )
            .await?;
        tracing::info!(account = creds.account_id(), adset_id, cents, "daily budget updated");
        Ok(())
    }
}
