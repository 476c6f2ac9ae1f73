//! Executes one configured action against the items that met a rule.

use adpilot_core::{ActionKind, ActionSpec, BudgetDirection, Level};
use adpilot_meta::{AdObject, CallKind, Credentials, MetaClient, MetaError};
use serde::Serialize;

use crate::notify::Notifier;

/// Outcome of one action on one item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub item_id: String,
    pub item_name: String,
    pub action_type: &'static str,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_budget: Option<f64>,
}

impl ActionResult {
    fn pending(item: &AdObject, spec: &ActionSpec) -> Self {
        Self {
            item_id: item.id().to_string(),
            item_name: if item.name().is_empty() {
                "Unknown".to_string()
            } else {
                item.name().to_string()
            },
            action_type: spec.kind.type_name(),
            success: false,
            message: String::new(),
            error: None,
            old_budget: None,
            new_budget: None,
        }
    }

    fn fail(&mut self, err: &MetaError) {
        let detail = err
            .platform_message()
            .map_or_else(|| err.to_string(), ToOwned::to_owned);
        self.success = false;
        self.message = format!("Failed to execute action: {detail}");
        self.error = Some(detail);
    }
}

/// What a budget adjustment resolves to before any write.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetPlan {
    Apply { current: f64, new: f64 },
    /// The cap would be crossed; the budget is left unchanged.
    Skip { current: f64, new: f64, message: String },
}

/// `current × (1 ± percent/100)`, bounded by the cap in the direction of travel.
#[must_use]
pub fn plan_budget(
    current: f64,
    direction: BudgetDirection,
    percent: f64,
    min_cap: Option<f64>,
    max_cap: Option<f64>,
) -> BudgetPlan {
    match direction {
        BudgetDirection::Increase => {
            let new = current * (1.0 + percent / 100.0);
            match max_cap {
                Some(cap) if new > cap => BudgetPlan::Skip {
                    current,
                    new,
                    message: format!(
                        "Budget increase would exceed max cap (${cap:.2}). \
                         Current: ${current:.2}, Would be: ${new:.2}. Action skipped."
                    ),
                },
                _ => BudgetPlan::Apply { current, new },
            }
        }
        BudgetDirection::Decrease => {
            let new = current * (1.0 - percent / 100.0);
            match min_cap {
                Some(cap) if new < cap => BudgetPlan::Skip {
                    current,
                    new,
                    message: format!(
                        "Budget decrease would go below min cap (${cap:.2}). \
                         Current: ${current:.2}, Would be: ${new:.2}. Action skipped."
                    ),
                },
                _ => BudgetPlan::Apply { current, new },
            }
        }
    }
}

/// Minor currency units, truncated toward zero.
#[allow(clippy::cast_possible_truncation)]
fn to_cents(units: f64) -> i64 {
    (units * 100.0) as i64
}

/// Runs an action for one rule run. Items are processed strictly one at a
/// time with the write delay between them.
pub struct ActionExecutor<'a> {
    pub client: &'a MetaClient,
    pub creds: &'a Credentials,
    pub level: Level,
    pub rule_name: &'a str,
    /// Present only when the account has a webhook configured.
    pub notifier: Option<(&'a Notifier, &'a str)>,
}

impl ActionExecutor<'_> {
    /// Applies `spec` to every item. Per-item failures are recorded in the
    /// results and never stop the remaining items.
    pub async fn execute(&self, items: &[AdObject], spec: &ActionSpec) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let mut result = ActionResult::pending(item, spec);
            self.apply(item, &spec.kind, &mut result).await;

            if !result.success {
                tracing::warn!(
                    item_id = %result.item_id,
                    action = result.action_type,
                    message = %result.message,
                    "action did not apply"
                );
            }

            if spec.notify {
                self.notify(&result).await;
            }
            results.push(result);

            if index + 1 < items.len() {
                self.client.pause(CallKind::Write).await;
            }
        }

        results
    }

    async fn apply(&self, item: &AdObject, kind: &ActionKind, result: &mut ActionResult) {
        match kind {
            ActionKind::SetStatus { status } => {
                match self.client.set_status(self.creds, item.id(), status).await {
                    Ok(()) => {
                        result.success = true;
                        result.message = format!("Status set to {status}");
                    }
                    Err(e) => result.fail(&e),
                }
            }

            ActionKind::AdjustDailyBudget {
                direction,
                percent,
                min_cap,
                max_cap,
            } => {
                if self.level != Level::AdSet {
                    result.message = "Budget adjustment only available for ad sets".to_string();
                    result.error = Some("Invalid rule level for budget adjustment".to_string());
                    return;
                }
                if let Err(e) = self
                    .adjust_budget(item.id(), *direction, *percent, *min_cap, *max_cap, result)
                    .await
                {
                    result.fail(&e);
                }
            }

            ActionKind::SendNotification => {
                result.success = true;
                result.message = "Notification sent (no changes made)".to_string();
                tracing::info!(
                    item_id = item.id(),
                    level = self.level.as_str(),
                    "notification-only action"
                );
            }
        }
    }

    async fn adjust_budget(
        &self,
        adset_id: &str,
        direction: BudgetDirection,
        percent: f64,
        min_cap: Option<f64>,
        max_cap: Option<f64>,
        result: &mut ActionResult,
    ) -> Result<(), MetaError> {
        let current = self.client.get_daily_budget_cents(self.creds, adset_id).await? / 100.0;

        match plan_budget(current, direction, percent, min_cap, max_cap) {
            BudgetPlan::Skip {
                current, message, ..
            } => {
                tracing::info!(adset_id, %message, "budget adjustment skipped");
                result.message = message;
                result.old_budget = Some(current);
                result.new_budget = Some(current);
            }
            BudgetPlan::Apply { current, new } => {
                self.client
                    .set_daily_budget(self.creds, adset_id, to_cents(new))
                    .await?;
                result.success = true;
                result.message = format!("Budget adjusted from ${current:.2} to ${new:.2}");
                result.old_budget = Some(current);
                result.new_budget = Some(new);
            }
        }
        Ok(())
    }

    async fn notify(&self, result: &ActionResult) {
        let Some((notifier, webhook_url)) = self.notifier else {
            return;
        };
        if result.action_type == "send_notification" {
            let mut summary = result.clone();
            summary.message = format!("Rule conditions met for {}", result.item_name);
            notifier.send(webhook_url, self.rule_name, &summary).await;
        } else {
            notifier.send(webhook_url, self.rule_name, result).await;
        }
    }
}
