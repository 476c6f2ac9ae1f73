//! Client-side scope narrowing and the server-side filter derived from a rule.

use std::collections::HashSet;

use adpilot_core::{Level, RuleConditions, ScopeFilters};
use adpilot_meta::{AdObject, Credentials, MetaClient, MetaError, ObjectFilter};

/// The filter pushed to the platform for `conditions`: the status allow-list
/// and any explicit campaign ids.
#[must_use]
pub fn server_filter(conditions: &RuleConditions) -> ObjectFilter {
    ObjectFilter {
        statuses: conditions.status_allowlist(),
        campaign_ids: conditions.scope.campaign_ids.clone(),
    }
}

fn contains_any(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords.iter().any(|k| name.contains(&k.to_lowercase()))
}

/// Whether `campaign_name_contains` must be resolved through a campaign fetch.
#[must_use]
pub fn needs_campaign_lookup(filters: &ScopeFilters, level: Level) -> bool {
    level != Level::Campaign && !filters.campaign_name_contains.is_empty()
}

/// Ids of the campaigns whose name contains any keyword.
#[must_use]
pub fn matching_campaign_ids(campaigns: &[AdObject], keywords: &[String]) -> HashSet<String> {
    campaigns
        .iter()
        .filter(|c| contains_any(c.name(), keywords))
        .map(|c| c.id().to_string())
        .collect()
}

/// Applies every non-empty filter in `filters` (logical AND).
///
/// `campaign_matches` is the resolved campaign-id set for
/// `campaign_name_contains` at ad and ad-set level. An empty set filters
/// everything out.
#[must_use]
pub fn apply_filters(
    items: Vec<AdObject>,
    filters: &ScopeFilters,
    level: Level,
    campaign_matches: Option<&HashSet<String>>,
) -> Vec<AdObject> {
    let ids: HashSet<&str> = filters.ids.iter().map(String::as_str).collect();
    let campaign_ids: HashSet<&str> = filters.campaign_ids.iter().map(String::as_str).collect();

    items
        .into_iter()
        .filter(|item| {
            filters.name_contains.is_empty() || contains_any(item.name(), &filters.name_contains)
        })
        .filter(|item| ids.is_empty() || ids.contains(item.id()))
        .filter(|item| {
            if campaign_ids.is_empty() {
                return true;
            }
            let campaign = match level {
                Level::Campaign => Some(item.id()),
                Level::AdSet | Level::Ad => item.campaign_id(),
            };
            campaign.is_some_and(|c| campaign_ids.contains(c))
        })
        .filter(|item| {
            if filters.campaign_name_contains.is_empty() {
                return true;
            }
            match level {
                Level::Campaign => contains_any(item.name(), &filters.campaign_name_contains),
                Level::AdSet | Level::Ad => campaign_matches.is_some_and(|matches| {
                    item.campaign_id().is_some_and(|c| matches.contains(c))
                }),
            }
        })
        .collect()
}

/// Narrows `items` by `filters`, fetching the account's campaigns when
/// campaign names must be resolved.
///
/// # Errors
///
/// Returns [`MetaError`] if the campaign fetch fails. The unfiltered list is
/// never returned in its place.
pub async fn apply(
    client: &MetaClient,
    creds: &Credentials,
    items: Vec<AdObject>,
    filters: &ScopeFilters,
    level: Level,
) -> Result<Vec<AdObject>, MetaError> {
    if filters.is_empty() {
        return Ok(items);
    }

    let campaign_matches = if needs_campaign_lookup(filters, level) {
        let campaigns = client.fetch_campaigns(creds).await?;
        let matches = matching_campaign_ids(&campaigns, &filters.campaign_name_contains);
        tracing::info!(
            account = creds.account_id(),
            keywords = ?filters.campaign_name_contains,
            campaigns = campaigns.len(),
            matched = matches.len(),
            "resolved campaign name filter"
        );
        Some(matches)
    } else {
        None
    };

    let before = items.len();
    let filtered = apply_filters(items, filters, level, campaign_matches.as_ref());
    tracing::info!(
        account = creds.account_id(),
        level = level.as_str(),
        before,
        after = filtered.len(),
        "applied scope filters"
    );
    Ok(filtered)
}
