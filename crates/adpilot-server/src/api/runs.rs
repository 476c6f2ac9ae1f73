use adpilot_engine::{RunError, RunSummary};
use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

/// Runs a rule once, outside its schedule.
pub(super) async fn run_rule(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(rule_id): Path<i64>,
) -> Result<Json<ApiResponse<RunSummary>>, ApiError> {
    adpilot_db::get_rule(&state.pool, rule_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let summary = state
        .runner
        .run(rule_id)
        .await
        .map_err(|e| map_run_error(req_id.0.clone(), &e))?;

    tracing::info!(
        rule_id,
        log_id = summary.log_id,
        decision = summary.decision.as_str(),
        "manual rule run complete"
    );

    Ok(Json(ApiResponse::new(summary, req_id.0)))
}

fn map_run_error(request_id: String, error: &RunError) -> ApiError {
    match error {
        RunError::RateLimited(_) => ApiError::new(request_id, "rate_limited", error.to_string()),
        RunError::Configuration(message) => {
            ApiError::new(request_id, "validation_error", message.clone())
        }
        RunError::Upstream(_) => ApiError::new(request_id, "upstream_error", error.to_string()),
        RunError::Store(e) => {
            tracing::error!(error = %e, "rule run failed on store access");
            ApiError::new(request_id, "internal_error", "rule store unavailable")
        }
    }
}

#[cfg(test)]
mod tests {
    use adpilot_core::StoreError;
    use adpilot_meta::MetaError;

    use super::*;

    #[test]
    fn rate_limit_maps_to_rate_limited_code() {
        let err = RunError::RateLimited(MetaError::RateLimited {
            message: "User request limit reached".to_string(),
        });
        let api = map_run_error("req".into(), &err);
        assert_eq!(api.error.code, "rate_limited");
        assert!(api.error.message.contains("Please wait a few minutes"));
    }

    #[test]
    fn configuration_error_is_a_validation_error() {
        let err = RunError::Configuration("Account has no Meta access token".into());
        let api = map_run_error("req".into(), &err);
        assert_eq!(api.error.code, "validation_error");
        assert_eq!(api.error.message, "Account has no Meta access token");
    }

    #[test]
    fn store_error_hides_details() {
        let err = RunError::Store(StoreError::new(std::io::Error::other("connection reset")));
        let api = map_run_error("req".into(), &err);
        assert_eq!(api.error.code, "internal_error");
        assert!(!api.error.message.contains("connection reset"));
    }
}
