use adpilot_core::RuleRecord;
use adpilot_engine::{ScheduledRule, SchedulerError};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct UnscheduleResult {
    rule_id: i64,
    triggers_removed: usize,
}

/// Re-reads the rule and replaces its triggers. Call after any change to
/// the rule's schedule or enabled flag.
pub(super) async fn reschedule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(rule_id): Path<i64>,
) -> Result<Json<ApiResponse<Option<ScheduledRule>>>, ApiError> {
    let row = adpilot_db::get_rule(&state.pool, rule_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let scheduled = state
        .scheduler
        .schedule(&RuleRecord::from(row))
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(scheduled, req_id.0)))
}

pub(super) async fn unschedule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(rule_id): Path<i64>,
) -> Result<Json<ApiResponse<UnscheduleResult>>, ApiError> {
    let triggers_removed = state
        .scheduler
        .unschedule(rule_id)
        .await
        .map_err(|e| map_scheduler_error(req_id.0.clone(), &e))?;

    adpilot_db::set_next_run_at(&state.pool, rule_id, None)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        UnscheduleResult {
            rule_id,
            triggers_removed,
        },
        req_id.0,
    )))
}

fn map_scheduler_error(request_id: String, error: &SchedulerError) -> ApiError {
    match error {
        SchedulerError::InvalidCron { .. }
        | SchedulerError::NoUpcomingFire(_)
        | SchedulerError::Schedule(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        SchedulerError::Broker(_) | SchedulerError::Store(_) => {
            tracing::error!(error = %error, "scheduling failed");
            ApiError::new(request_id, "internal_error", "scheduling failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cron_is_a_validation_error() {
        let err = SchedulerError::InvalidCron {
            expression: "61 * * * *".to_string(),
            reason: "minute out of range".to_string(),
        };
        let api = map_scheduler_error("req".into(), &err);
        assert_eq!(api.error.code, "validation_error");
        assert!(api.error.message.contains("61 * * * *"));
    }

    #[test]
    fn broker_failure_is_internal() {
        let err = SchedulerError::Broker("job store closed".to_string());
        let api = map_scheduler_error("req".into(), &err);
        assert_eq!(api.error.code, "internal_error");
    }
}
