//! Outbound webhook notifications for action results.
//!
//! Delivery is best-effort: failures are logged and never reach the caller.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

use crate::actions::ActionResult;

const MAX_ERROR_LEN: usize = 500;

pub struct Notifier {
    client: Client,
    timeout: Duration,
}

impl Notifier {
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent("adpilot/0.1 (campaign-automation)")
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Posts one action result to `webhook_url`. Returns whether delivery
    /// succeeded.
    pub async fn send(&self, webhook_url: &str, rule_name: &str, result: &ActionResult) -> bool {
        let payload = build_payload(rule_name, result, Utc::now().timestamp());

        let response = self
            .client
            .post(webhook_url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match response {
            Ok(_) => {
                tracing::info!(item_id = %result.item_id, rule = rule_name, "notification sent");
                true
            }
            Err(e) => {
                tracing::error!(
                    item_id = %result.item_id,
                    rule = rule_name,
                    error = %e.without_url(),
                    "failed to send notification"
                );
                false
            }
        }
    }
}

fn action_display(result: &ActionResult) -> String {
    match result.action_type {
        "set_status" => format!("Set Status: {}", result.message),
        "adjust_daily_budget" => match (result.old_budget, result.new_budget) {
            (Some(old), Some(new)) => format!("Budget Adjusted: ${old:.2} → ${new:.2}"),
            _ => "Adjust Daily Budget".to_string(),
        },
        "send_notification" => "Notification: Rule conditions met".to_string(),
        other => other.replace('_', " "),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Attachment-style payload coloured by outcome.
#[must_use]
pub fn build_payload(rule_name: &str, result: &ActionResult, timestamp: i64) -> Value {
    let (color, marker, status) = if result.success {
        ("good", "✅", "Success")
    } else {
        ("danger", "❌", "Failed")
    };

    let mut fields = vec![
        json!({"title": "Item", "value": result.item_name, "short": true}),
        json!({"title": "Item ID", "value": result.item_id, "short": true}),
        json!({"title": "Action", "value": action_display(result), "short": false}),
        json!({"title": "Status", "value": status, "short": true}),
    ];
    if !result.success {
        if let Some(error) = &result.error {
            fields.push(json!({
                "title": "Error",
                "value": truncate(error, MAX_ERROR_LEN),
                "short": false
            }));
        }
    }

    json!({
        "attachments": [{
            "color": color,
            "title": format!("{marker} Rule Action Executed: {rule_name}"),
            "fields": fields,
            "footer": "adpilot",
            "ts": timestamp,
        }]
    })
}
