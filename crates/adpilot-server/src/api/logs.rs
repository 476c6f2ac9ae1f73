use adpilot_db::RuleLogRow;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RuleLogsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct RuleLogItem {
    log_id: i64,
    rule_id: i64,
    status: String,
    message: String,
    details: Value,
    created_at: DateTime<Utc>,
}

impl From<RuleLogRow> for RuleLogItem {
    fn from(row: RuleLogRow) -> Self {
        Self {
            log_id: row.id,
            rule_id: row.rule_id,
            status: row.status,
            message: row.message,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn list_logs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(rule_id): Path<i64>,
    Query(query): Query<RuleLogsQuery>,
) -> Result<Json<ApiResponse<Vec<RuleLogItem>>>, ApiError> {
    let rows = adpilot_db::list_rule_logs(
        &state.pool,
        rule_id,
        normalize_limit(query.limit),
        query.offset.unwrap_or(0),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(RuleLogItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn delete_log(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(log_id): Path<i64>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    adpilot_db::delete_rule_log(&state.pool, log_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(log_id, "rule log deleted");
    Ok(Json(ApiResponse::new(
        json!({ "log_id": log_id, "deleted": true }),
        req_id.0,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_log_item_is_serializable() {
        let item = RuleLogItem::from(RuleLogRow {
            id: 7,
            rule_id: 3,
            status: "success".to_string(),
            message: "Rule executed successfully. 2 actions taken.".to_string(),
            details: json!({ "stage": "done" }),
            created_at: Utc::now(),
        });

        let json = serde_json::to_string(&item).expect("serialize rule log");
        assert!(json.contains("\"log_id\":7"));
        assert!(json.contains("\"status\":\"success\""));
        assert!(json.contains("\"stage\":\"done\""));
    }
}
