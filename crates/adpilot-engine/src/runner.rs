//! Rule execution: fetch, narrow, gather insights, evaluate, act, log.
//!
//! Every call to [`RuleRunner::run`] for an existing rule writes exactly one
//! run log, whatever the outcome.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use adpilot_core::{
    AccountRecord, ConditionField, Level, Rule, RuleRecord, RuleStore, RunStatus, StoreError,
};
use adpilot_meta::{AdObject, CallKind, Credentials, DateRange, Insight, MetaClient, MetaError};
use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::actions::{ActionExecutor, ActionResult};
use crate::evaluator::{self, Evaluation, ItemContext};
use crate::grouping::{group_by_time_range, TimeRangeGroup};
use crate::notify::Notifier;
use crate::scope;
use crate::signals::{self, WinningDays};

/// Fetched items recorded verbatim in the run log.
const LOGGED_SAMPLE_ITEMS: usize = 10;

#[derive(Debug, Error)]
pub enum RunError {
    /// Missing rule, account, or credentials, or an invalid rule document.
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    RateLimited(#[source] MetaError),

    #[error("{0}")]
    Upstream(#[source] MetaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<MetaError> for RunError {
    fn from(err: MetaError) -> Self {
        if err.is_rate_limited() {
            RunError::RateLimited(err)
        } else {
            RunError::Upstream(err)
        }
    }
}

/// Step of a run, recorded in the log so failures show how far they got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Filtering,
    InsightsGathering,
    AuxiliaryResolution,
    Evaluating,
    Deciding,
    Acting,
    Logging,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Proceed,
    Skip,
    /// The rule is disabled; nothing was fetched.
    Disabled,
}

impl Decision {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Proceed => "proceed",
            Decision::Skip => "skip",
            Decision::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rule_id: i64,
    pub log_id: i64,
    pub message: String,
    pub decision: Decision,
    pub items_checked: usize,
    pub items_meeting_conditions: usize,
    pub log_details: Value,
}

/// Per-item evaluation record for the log.
#[derive(Debug, Clone, Serialize)]
struct ItemEvaluation {
    item_id: String,
    item_name: String,
    conditions_evaluated: Vec<Evaluation>,
    all_conditions_met: bool,
}

/// Insights fetched for one time-range group.
#[derive(Default)]
struct GroupData {
    insights: HashMap<String, Insight>,
    daily: HashMap<String, Vec<Insight>>,
}

struct Outcome {
    decision: Decision,
    items_checked: usize,
    items_meeting_conditions: usize,
    message: String,
}

/// Diagnostic trail accumulated over one run.
struct Trail {
    details: Map<String, Value>,
    stage: Stage,
}

impl Trail {
    fn new() -> Self {
        Self {
            details: Map::new(),
            stage: Stage::Fetching,
        }
    }

    fn enter(&mut self, rule_id: i64, stage: Stage) {
        self.stage = stage;
        tracing::debug!(rule_id, stage = ?stage, "run stage");
    }

    fn set(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
    }

    fn into_value(mut self) -> Value {
        let stage = serde_json::to_value(self.stage).unwrap_or(Value::Null);
        self.details.insert("stage".to_string(), stage);
        Value::Object(self.details)
    }
}

pub struct RuleRunner {
    store: Arc<dyn RuleStore>,
    meta: Arc<MetaClient>,
    notifier: Option<Arc<Notifier>>,
    default_tz: Tz,
}

impl RuleRunner {
    #[must_use]
    pub fn new(
        store: Arc<dyn RuleStore>,
        meta: Arc<MetaClient>,
        notifier: Option<Arc<Notifier>>,
        default_tz: Tz,
    ) -> Self {
        Self {
            store,
            meta,
            notifier,
            default_tz,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Runs rule `rule_id` once and logs the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Configuration`] for an unknown rule (no log is
    /// written, as there is no rule to attach it to), a missing account,
    /// missing credentials, or an invalid rule document. Upstream and store
    /// failures during the run are logged as an `error` entry and returned;
    /// when the store itself is failing that log is best-effort.
    pub async fn run(&self, rule_id: i64) -> Result<RunSummary, RunError> {
        let record = match self.store.rule(rule_id).await {
            Ok(record) => record,
            Err(e) => return Err(self.lookup_failed(rule_id, e).await),
        };
        let Some(record) = record else {
            return Err(RunError::Configuration(format!("Rule {rule_id} not found")));
        };

        if !record.enabled {
            let log_id = self
                .store
                .append_log(rule_id, RunStatus::Skipped, "Rule is disabled", &json!({}))
                .await?;
            tracing::info!(rule_id, "rule is disabled; skipped");
            return Ok(RunSummary {
                rule_id,
                log_id,
                message: "Rule is disabled".to_string(),
                decision: Decision::Disabled,
                items_checked: 0,
                items_meeting_conditions: 0,
                log_details: json!({}),
            });
        }

        let rule = match Rule::from_record(&record, self.default_tz) {
            Ok(rule) => rule,
            Err(e) => {
                return Err(self
                    .fail_early(rule_id, RunError::Configuration(format!("Invalid rule: {e}")))
                    .await);
            }
        };

        let account = match self.store.account(rule.account_id).await {
            Ok(account) => account,
            Err(e) => return Err(self.lookup_failed(rule_id, e).await),
        };
        let Some(account) = account else {
            return Err(self
                .fail_early(rule_id, RunError::Configuration("Ad account not found".to_string()))
                .await);
        };

        let Some(creds) = resolve_credentials(&rule, &account) else {
            return Err(self
                .fail_early(
                    rule_id,
                    RunError::Configuration("Meta account ID or access token missing".to_string()),
                )
                .await);
        };

        tracing::info!(
            rule_id,
            rule = %rule.name,
            account = creds.account_id(),
            level = rule.conditions.level.as_str(),
            "starting rule run"
        );

        let mut trail = Trail::new();
        trail.set("timestamp", Utc::now().to_rfc3339());
        trail.set("rule_level", rule.conditions.level);
        trail.set("scope_filters", &rule.conditions.scope);
        trail.set("time_range", rule.conditions.time_range);
        trail.set("conditions", raw_conditions(&record));

        let webhook = account.notification_webhook_url.as_deref();
        match self.execute(&rule, &creds, webhook, &mut trail).await {
            Ok(outcome) => {
                trail.enter(rule_id, Stage::Logging);
                let status = match outcome.decision {
                    Decision::Proceed => RunStatus::Success,
                    Decision::Skip | Decision::Disabled => RunStatus::Skipped,
                };
                trail.stage = Stage::Done;
                let details = trail.into_value();
                let log_id = self
                    .store
                    .append_log(rule_id, status, &outcome.message, &details)
                    .await?;

                tracing::info!(
                    rule_id,
                    decision = outcome.decision.as_str(),
                    items_checked = outcome.items_checked,
                    matched = outcome.items_meeting_conditions,
                    "rule run finished"
                );
                Ok(RunSummary {
                    rule_id,
                    log_id,
                    message: outcome.message,
                    decision: outcome.decision,
                    items_checked: outcome.items_checked,
                    items_meeting_conditions: outcome.items_meeting_conditions,
                    log_details: details,
                })
            }
            Err(e) => {
                tracing::error!(rule_id, stage = ?trail.stage, error = %e, "rule run failed");
                trail.set("error", e.to_string());
                let details = trail.into_value();
                let message = format!("Error testing rule: {e}");
                if let Err(log_err) = self
                    .store
                    .append_log(rule_id, RunStatus::Error, &message, &details)
                    .await
                {
                    tracing::error!(rule_id, error = %log_err, "failed to write error log");
                }
                Err(e)
            }
        }
    }

    /// Best-effort error log for a store failure while loading the rule or
    /// its account. The original store error is what the caller sees.
    async fn lookup_failed(&self, rule_id: i64, err: StoreError) -> RunError {
        tracing::error!(rule_id, error = %err, "rule run aborted by store failure");
        let message = format!("Error testing rule: {err}");
        if let Err(log_err) = self
            .store
            .append_log(rule_id, RunStatus::Error, &message, &json!({"error": err.to_string()}))
            .await
        {
            tracing::warn!(rule_id, error = %log_err, "could not record failed run");
        }
        RunError::Store(err)
    }

    async fn fail_early(&self, rule_id: i64, err: RunError) -> RunError {
        let message = err.to_string();
        tracing::error!(rule_id, error = %message, "rule run rejected");
        if let Err(log_err) = self
            .store
            .append_log(rule_id, RunStatus::Error, &message, &json!({}))
            .await
        {
            return RunError::Store(log_err);
        }
        err
    }

    /// Wall clock used to resolve time windows: the schedule's timezone when
    /// the rule has one, otherwise the configured default.
    fn local_now(&self, rule: &Rule) -> NaiveDateTime {
        let tz = rule
            .schedule
            .as_ref()
            .map_or(self.default_tz, adpilot_core::Schedule::timezone);
        Utc::now().with_timezone(&tz).naive_local()
    }

    #[allow(clippy::too_many_lines)]
    async fn execute(
        &self,
        rule: &Rule,
        creds: &Credentials,
        webhook: Option<&str>,
        trail: &mut Trail,
    ) -> Result<Outcome, RunError> {
        let conditions = &rule.conditions;
        let level = conditions.level;

        trail.enter(rule.id, Stage::Fetching);
        let filter = scope::server_filter(conditions);
        let fetched = self.meta.fetch_objects(creds, level, &filter).await?;
        trail.set(
            "data_fetch",
            json!({
                "total_items": fetched.len(),
                "items": &fetched[..fetched.len().min(LOGGED_SAMPLE_ITEMS)],
            }),
        );

        trail.enter(rule.id, Stage::Filtering);
        let items = scope::apply(&self.meta, creds, fetched, &conditions.scope, level).await?;
        trail.set(
            "filtered_data",
            items
                .iter()
                .map(|item| {
                    json!({
                        "id": item.id(),
                        "name": item.name(),
                        "status": item.status(),
                        "effective_status": item.effective_status(),
                    })
                })
                .collect::<Vec<_>>(),
        );

        trail.enter(rule.id, Stage::InsightsGathering);
        let groups = group_by_time_range(&conditions.clauses, conditions.time_range);
        let group_data = self
            .gather_insights(creds, level, &items, &groups, self.local_now(rule))
            .await?;
        let total_insights: usize = group_data.iter().map(|g| g.insights.len()).sum();
        trail.set(
            "insights_summary",
            json!({
                "unique_time_ranges": groups.len(),
                "time_range_groups": groups
                    .iter()
                    .map(|g| (g.time_range.to_string(), json!({
                        "time_range": g.time_range,
                        "condition_count": g.clauses.len(),
                    })))
                    .collect::<Map<String, Value>>(),
                "total_insights_fetched": total_insights,
            }),
        );

        trail.enter(rule.id, Stage::AuxiliaryResolution);
        let campaign_statuses = self.campaign_statuses(rule, creds, &items).await;
        let active_ads = if conditions.needs_active_ads() {
            self.active_ad_counts(creds, level, &items).await?
        } else {
            HashMap::new()
        };

        trail.enter(rule.id, Stage::Evaluating);
        let mut clause_group = vec![0; conditions.clauses.len()];
        for (group_index, group) in groups.iter().enumerate() {
            for &clause_index in &group.clauses {
                clause_group[clause_index] = group_index;
            }
        }

        let empty_insight = Insight::default();
        let mut evaluations = Vec::with_capacity(items.len());
        let mut passing: Vec<AdObject> = Vec::new();
        for item in &items {
            let active = signals::active_ads_parent(level, item)
                .and_then(|parent| active_ads.get(parent).copied());

            let mut results = Vec::with_capacity(conditions.clauses.len());
            for (index, clause) in conditions.clauses.iter().enumerate() {
                let data = &group_data[clause_group[index]];
                let winning_days = match clause.field {
                    ConditionField::CppWinningDays { threshold } => {
                        let daily = data.daily.get(item.id()).map_or(&[][..], Vec::as_slice);
                        Some(WinningDays::compute(daily, threshold))
                    }
                    _ => None,
                };
                let ctx = ItemContext {
                    item,
                    insight: data.insights.get(item.id()).unwrap_or(&empty_insight),
                    campaign_statuses: &campaign_statuses,
                    winning_days: winning_days.as_ref(),
                    active_ads: active,
                };

                let mut evaluation = evaluator::evaluate(clause, &ctx);
                evaluation.time_range_used = Some(
                    clause
                        .time_range
                        .and_then(|tr| serde_json::to_value(tr).ok())
                        .unwrap_or_else(|| Value::String("global".to_string())),
                );
                results.push(evaluation);
            }

            let all_met = results.iter().all(|e| e.passed);
            tracing::debug!(rule_id = rule.id, item_id = item.id(), all_met, "item evaluated");
            if all_met {
                passing.push(item.clone());
            }
            evaluations.push(ItemEvaluation {
                item_id: item.id().to_string(),
                item_name: item.name().to_string(),
                conditions_evaluated: results,
                all_conditions_met: all_met,
            });
        }
        trail.set("evaluations", &evaluations);

        trail.enter(rule.id, Stage::Deciding);
        let decision = if passing.is_empty() {
            Decision::Skip
        } else {
            Decision::Proceed
        };
        trail.set("decision", decision);
        trail.set("items_meeting_conditions_count", passing.len());
        trail.set(
            "items_meeting_conditions",
            passing
                .iter()
                .map(|item| json!({"id": item.id(), "name": item.name()}))
                .collect::<Vec<_>>(),
        );

        trail.enter(rule.id, Stage::Acting);
        let mut executed: Vec<ActionResult> = Vec::new();
        if decision == Decision::Proceed {
            let executor = ActionExecutor {
                client: &self.meta,
                creds,
                level,
                rule_name: &rule.name,
                notifier: match (&self.notifier, webhook) {
                    (Some(notifier), Some(url)) if !url.trim().is_empty() => {
                        Some((notifier.as_ref(), url))
                    }
                    _ => None,
                },
            };
            for spec in &rule.actions {
                executed.extend(executor.execute(&passing, spec).await);
            }
        }
        trail.set("actions_executed", &executed);

        let message = if executed.is_empty() {
            format!(
                "Test completed: {} item(s) meet all conditions",
                passing.len()
            )
        } else {
            let ok = executed.iter().filter(|r| r.success).count();
            format!(
                "Executed actions on {ok}/{} item(s). {} item(s) met all conditions.",
                executed.len(),
                passing.len()
            )
        };

        Ok(Outcome {
            decision,
            items_checked: items.len(),
            items_meeting_conditions: passing.len(),
            message,
        })
    }

    async fn gather_insights(
        &self,
        creds: &Credentials,
        level: Level,
        items: &[AdObject],
        groups: &[TimeRangeGroup],
        now: NaiveDateTime,
    ) -> Result<Vec<GroupData>, MetaError> {
        let ids: Vec<String> = items.iter().map(|i| i.id().to_string()).collect();
        let mut data = Vec::with_capacity(groups.len());

        for group in groups {
            let mut fetched = GroupData::default();
            if ids.is_empty() {
                data.push(fetched);
                continue;
            }

            let range = DateRange::resolve(&group.time_range, now);
            if group.needs_insights {
                tracing::info!(
                    window = %group.time_range,
                    range = %range,
                    clauses = group.clauses.len(),
                    "fetching insights"
                );
                fetched.insights = self.meta.fetch_insights(creds, level, &ids, range).await?;
            }
            if group.needs_daily {
                tracing::info!(window = %group.time_range, range = %range, "fetching daily insights");
                fetched.daily = self
                    .meta
                    .fetch_daily_insights(creds, level, &ids, range)
                    .await?;
            }
            data.push(fetched);
        }

        Ok(data)
    }

    /// Statuses of the items' campaigns. A failed lookup leaves the cache
    /// empty and the affected clauses fail on their own.
    async fn campaign_statuses(
        &self,
        rule: &Rule,
        creds: &Credentials,
        items: &[AdObject],
    ) -> HashMap<String, String> {
        if !rule.conditions.needs_campaign_statuses() || rule.conditions.level == Level::Campaign {
            return HashMap::new();
        }

        let campaign_ids: Vec<String> = items
            .iter()
            .filter_map(AdObject::campaign_id)
            .map(ToOwned::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if campaign_ids.is_empty() {
            return HashMap::new();
        }

        match self.meta.fetch_campaign_statuses(creds, &campaign_ids).await {
            Ok(statuses) => {
                tracing::info!(rule_id = rule.id, cached = statuses.len(), "campaign statuses cached");
                statuses
            }
            Err(e) => {
                tracing::warn!(rule_id = rule.id, error = %e, "failed to fetch campaign statuses");
                HashMap::new()
            }
        }
    }

    /// Active-ad counts keyed by parent id. Each parent is fetched once.
    async fn active_ad_counts(
        &self,
        creds: &Credentials,
        level: Level,
        items: &[AdObject],
    ) -> Result<HashMap<String, usize>, MetaError> {
        let mut counts: HashMap<String, usize> = HashMap::new();

        for item in items {
            let Some(parent) = signals::active_ads_parent(level, item) else {
                tracing::warn!(item_id = item.id(), "no parent ad set; counting zero active ads");
                continue;
            };
            if counts.contains_key(parent) {
                continue;
            }
            if !counts.is_empty() {
                self.meta.pause(CallKind::Read).await;
            }
            let ads = self.meta.fetch_child_ads(creds, parent).await?;
            let active = signals::count_active_ads(&ads);
            tracing::info!(parent, active, total = ads.len(), "counted active ads");
            counts.insert(parent.to_string(), active);
        }

        Ok(counts)
    }
}

/// Rule-level credentials override the account's, field by field.
fn resolve_credentials(rule: &Rule, account: &AccountRecord) -> Option<Credentials> {
    let non_blank = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(ToOwned::to_owned);
    let account_id = rule
        .credentials
        .account_id
        .clone()
        .or_else(|| non_blank(account.meta_account_id.as_deref()))?;
    let token = rule
        .credentials
        .access_token
        .clone()
        .or_else(|| non_blank(account.meta_access_token.as_deref()))?;
    Some(Credentials::new(&account_id, &token))
}

fn raw_conditions(record: &RuleRecord) -> Value {
    record
        .conditions
        .get("conditions")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()))
}

#[cfg(test)]
mod tests {
    use adpilot_core::CredentialOverride;

    use super::*;

    fn account(meta_id: Option<&str>, token: Option<&str>) -> AccountRecord {
        AccountRecord {
            id: 1,
            name: "Main".into(),
            meta_account_id: meta_id.map(Into::into),
            meta_access_token: token.map(Into::into),
            notification_webhook_url: None,
        }
    }

    fn rule(overrides: CredentialOverride) -> Rule {
        let record = RuleRecord {
            id: 7,
            account_id: 1,
            name: "r".into(),
            description: None,
            enabled: true,
            schedule: None,
            conditions: json!({"conditions": [{"field": "spend", "operator": ">", "value": 1}]}),
            actions: json!({"actions": [{"type": "send_notification"}]}),
            meta_account_id: None,
            meta_access_token: None,
            last_run_at: None,
            next_run_at: None,
        };
        let mut rule = Rule::from_record(&record, Tz::UTC).unwrap();
        rule.credentials = overrides;
        rule
    }

    #[test]
    fn rule_credentials_override_account() {
        let creds = resolve_credentials(
            &rule(CredentialOverride {
                account_id: Some("999".into()),
                access_token: None,
            }),
            &account(Some("act_1"), Some("account-token")),
        )
        .unwrap();
        assert_eq!(creds.account_id(), "act_999");
        assert_eq!(creds.access_token(), "account-token");
    }

    #[test]
    fn blank_account_credentials_are_missing() {
        let missing = resolve_credentials(
            &rule(CredentialOverride::default()),
            &account(Some("  "), Some("token")),
        );
        assert!(missing.is_none());
    }

    #[test]
    fn rate_limits_classify_separately() {
        let err: RunError = MetaError::RateLimited {
            message: "slow down".into(),
        }
        .into();
        assert!(matches!(err, RunError::RateLimited(_)));

        let err: RunError = MetaError::PaginationLimit {
            context: "ads".into(),
            max_pages: 200,
        }
        .into();
        assert!(matches!(err, RunError::Upstream(_)));
    }
}
