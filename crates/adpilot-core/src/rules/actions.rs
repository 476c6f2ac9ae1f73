use serde::Serialize;
use serde_json::{Map, Value};

use super::lenient;
use super::RuleDocumentError;

const ALLOWED_STATUSES: [&str; 4] = ["ACTIVE", "PAUSED", "ARCHIVED", "DELETED"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetDirection {
    #[default]
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    SetStatus {
        status: String,
    },
    AdjustDailyBudget {
        direction: BudgetDirection,
        percent: f64,
        /// Floor in currency units; never crossed on decrease.
        min_cap: Option<f64>,
        /// Ceiling in currency units; never crossed on increase.
        max_cap: Option<f64>,
    },
    SendNotification,
}

impl ActionKind {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::SetStatus { .. } => "set_status",
            ActionKind::AdjustDailyBudget { .. } => "adjust_daily_budget",
            ActionKind::SendNotification => "send_notification",
        }
    }
}

/// One configured action plus its notification flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSpec {
    #[serde(flatten)]
    pub kind: ActionKind,
    #[serde(rename = "send_slack_notification")]
    pub notify: bool,
}

impl ActionSpec {
    /// # Errors
    ///
    /// Returns [`RuleDocumentError::UnknownActionType`] or
    /// [`RuleDocumentError::InvalidAction`].
    pub fn from_value(value: &Value) -> Result<Self, RuleDocumentError> {
        let Some(obj) = value.as_object() else {
            return Err(RuleDocumentError::InvalidDocument(
                "each action must be an object".to_string(),
            ));
        };

        let type_name = obj
            .get("type")
            .and_then(Value::as_str)
            .map(str::trim)
            .ok_or_else(|| {
                RuleDocumentError::InvalidDocument("action is missing 'type'".to_string())
            })?;

        let kind = match type_name {
            "set_status" => ActionKind::SetStatus {
                status: parse_status(obj)?,
            },
            "adjust_daily_budget" => parse_budget(obj)?,
            "send_notification" => ActionKind::SendNotification,
            other => return Err(RuleDocumentError::UnknownActionType(other.to_string())),
        };

        Ok(Self {
            kind,
            notify: lenient::flag(obj.get("send_slack_notification"), true),
        })
    }
}

fn parse_status(obj: &Map<String, Value>) -> Result<String, RuleDocumentError> {
    let status = obj
        .get("status")
        .and_then(Value::as_str)
        .map_or_else(|| "PAUSED".to_string(), |s| s.trim().to_uppercase());

    if ALLOWED_STATUSES.contains(&status.as_str()) {
        Ok(status)
    } else {
        Err(RuleDocumentError::InvalidAction {
            action: "set_status".to_string(),
            reason: format!(
                "status '{status}' must be one of {}",
                ALLOWED_STATUSES.join(", ")
            ),
        })
    }
}

fn parse_budget(obj: &Map<String, Value>) -> Result<ActionKind, RuleDocumentError> {
    let invalid = |reason: String| RuleDocumentError::InvalidAction {
        action: "adjust_daily_budget".to_string(),
        reason,
    };

    let direction = match obj.get("direction").and_then(Value::as_str).map(str::trim) {
        None | Some("increase") => BudgetDirection::Increase,
        Some("decrease") => BudgetDirection::Decrease,
        Some(other) => return Err(invalid(format!("unknown direction '{other}'"))),
    };

    let percent = obj
        .get("percent")
        .and_then(lenient::number)
        .ok_or_else(|| invalid("'percent' is required".to_string()))?;
    if percent < 0.0 {
        return Err(invalid(format!("percent must not be negative, got {percent}")));
    }
    if direction == BudgetDirection::Decrease && percent > 100.0 {
        return Err(invalid(format!(
            "a decrease cannot exceed 100 percent, got {percent}"
        )));
    }

    let cap = |key: &str| -> Result<Option<f64>, RuleDocumentError> {
        match obj.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(v) => lenient::number(v)
                .map(Some)
                .ok_or_else(|| invalid(format!("'{key}' must be numeric"))),
        }
    };
    let min_cap = cap("min_cap")?;
    let max_cap = cap("max_cap")?;

    if let (Some(min), Some(max)) = (min_cap, max_cap) {
        if min > max {
            return Err(invalid(format!(
                "min_cap ({min}) exceeds max_cap ({max})"
            )));
        }
    }

    Ok(ActionKind::AdjustDailyBudget {
        direction,
        percent,
        min_cap,
        max_cap,
    })
}

/// Parses a stored actions document.
///
/// Accepts `null` (no actions), a bare list, or `{"actions": [...]}`.
///
/// # Errors
///
/// Returns the first invalid action's [`RuleDocumentError`].
pub fn parse_actions(doc: &Value) -> Result<Vec<ActionSpec>, RuleDocumentError> {
    let items = match doc {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("actions") {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(_) => {
                return Err(RuleDocumentError::InvalidDocument(
                    "'actions' must be a list".to_string(),
                ))
            }
        },
        _ => {
            return Err(RuleDocumentError::InvalidDocument(
                "actions must be a list or an object with an 'actions' list".to_string(),
            ))
        }
    };

    items.iter().map(ActionSpec::from_value).collect()
}
