//! Integration tests for `MetaClient` using wiremock HTTP mocks.

use std::sync::Arc;

use adpilot_core::Level;
use adpilot_meta::{
    ClientSettings, Credentials, DateRange, MetaClient, MetaError, ObjectFilter, UsageTracker,
};
use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> MetaClient {
    let settings = ClientSettings::default()
        .with_base_url(base_url)
        .without_delays();
    MetaClient::new(settings, Arc::new(UsageTracker::new(10)))
        .expect("client construction should not fail")
}

fn creds() -> Credentials {
    Credentials::new("123", "test-token")
}

fn week() -> DateRange {
    DateRange {
        since: NaiveDate::from_ymd_opt(2026, 3, 3).unwrap(),
        until: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
    }
}

#[tokio::test]
async fn fetch_objects_follows_cursor_and_keeps_filter() {
    let server = MockServer::start().await;
    let filter = ObjectFilter {
        statuses: vec!["ACTIVE".into()],
        campaign_ids: Vec::new(),
    };
    let filtering = filter.to_param(Level::AdSet);

    // The cursor URL deliberately omits `filtering`.
    let next = format!("{}/act_123/adsets?limit=2000&after=cursor2", server.uri());

    Mock::given(method("GET"))
        .and(path("/act_123/adsets"))
        .and(query_param("after", "cursor2"))
        .and(query_param("filtering", filtering.as_str()))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "3", "name": "C", "effective_status": "ACTIVE"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/act_123/adsets"))
        .and(query_param("limit", "2000"))
        .and(query_param("filtering", filtering.as_str()))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "1", "name": "A", "effective_status": "ACTIVE", "daily_budget": "5000"},
                {"id": "2", "name": "B", "effective_status": "ACTIVE"}
            ],
            "paging": {"next": next}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let objects = client
        .fetch_objects(&creds(), Level::AdSet, &filter)
        .await
        .expect("fetch should succeed");

    let ids: Vec<&str> = objects.iter().map(|o| o.id()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(objects[0].daily_budget_cents(), Some(5000.0));
}

#[tokio::test]
async fn rate_limit_response_aborts_fetch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/act_123/ads"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "User request limit reached",
                "type": "OAuthException",
                "code": 17
            }
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .fetch_objects(&creds(), Level::Ad, &ObjectFilter::default())
        .await
        .expect_err("throttled fetch should fail");

    assert!(err.is_rate_limited());
    assert!(err.to_string().contains("User request limit reached"));
}

#[tokio::test]
async fn insights_are_batched_and_missing_ids_default_to_empty() {
    let server = MockServer::start().await;
    let ids: Vec<String> = (1..=60).map(|i| i.to_string()).collect();

    Mock::given(method("GET"))
        .and(path("/act_123/insights"))
        .and(query_param("level", "adset"))
        .and(query_param("action_breakdowns", "action_type"))
        .and(query_param(
            "time_range",
            r#"{"since":"2026-03-03","until":"2026-03-09"}"#,
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"adset_id": "1", "spend": "12.50"},
                {"adset_id": "55", "spend": "80"}
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let insights = client
        .fetch_insights(&creds(), Level::AdSet, &ids, week())
        .await
        .expect("insights should succeed");

    assert_eq!(insights.len(), 60);
    assert!((insights["1"].spend() - 12.5).abs() < f64::EPSILON);
    assert!((insights["55"].spend() - 80.0).abs() < f64::EPSILON);
    assert!(insights["2"].is_empty());
}

#[tokio::test]
async fn insights_request_cost_per_result_for_purchase_fallback() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/act_123/insights"))
        .and(query_param("fields", adpilot_meta::filter::INSIGHT_FIELDS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "adset_id": "1",
                "spend": "40",
                "cost_per_result": [{
                    "indicator": "actions:offsite_conversion.fb_pixel_purchase",
                    "values": [{"value": "20"}]
                }]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let ids = vec!["1".to_string()];
    let insights = client
        .fetch_insights(&creds(), Level::AdSet, &ids, week())
        .await
        .expect("insights should succeed");

    assert!(adpilot_meta::filter::INSIGHT_FIELDS.contains("cost_per_result"));
    assert_eq!(insights["1"].cost_per_purchase_result(), Some(20.0));
}

#[tokio::test]
async fn daily_insights_group_rows_per_object() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/act_123/insights"))
        .and(query_param("time_increment", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"ad_id": "7", "date_start": "2026-03-04", "spend": "10"},
                {"ad_id": "7", "date_start": "2026-03-03", "spend": "20"},
                {"ad_id": "8", "date_start": "2026-03-03", "spend": "5"}
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let ids = vec!["7".to_string(), "8".to_string(), "9".to_string()];
    let daily = client
        .fetch_daily_insights(&creds(), Level::Ad, &ids, week())
        .await
        .expect("daily insights should succeed");

    assert_eq!(daily["7"].len(), 2);
    assert_eq!(daily["7"][0].date_start(), Some("2026-03-03"));
    assert_eq!(daily["8"].len(), 1);
    assert!(daily["9"].is_empty());
}

#[tokio::test]
async fn budget_update_posts_cents() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/42"))
        .and(query_param("fields", "daily_budget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "42",
            "daily_budget": "5000"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/42"))
        .and(body_string_contains("daily_budget=6000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let current = client
        .get_daily_budget_cents(&creds(), "42")
        .await
        .expect("budget read should succeed");
    assert!((current - 5000.0).abs() < f64::EPSILON);

    client
        .set_daily_budget(&creds(), "42", 6000)
        .await
        .expect("budget write should succeed");
}

#[tokio::test]
async fn set_status_surfaces_platform_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/99"))
        .and(body_string_contains("status=PAUSED"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "Object does not exist", "code": 100}
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client
        .set_status(&creds(), "99", "PAUSED")
        .await
        .expect_err("update should fail");

    assert!(matches!(err, MetaError::Api { code: Some(100), .. }));
    assert_eq!(err.platform_message(), Some("Object does not exist"));
}

#[tokio::test]
async fn usage_headers_are_recorded_per_account() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/5/ads"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ad-account-usage", r#"{"acc_id_util_pct":42}"#)
                .set_body_json(json!({
                    "data": [
                        {"id": "a", "effective_status": "ACTIVE"},
                        {"id": "b", "effective_status": "PAUSED"}
                    ]
                })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let ads = client
        .fetch_child_ads(&creds(), "5")
        .await
        .expect("child ads should succeed");

    assert_eq!(ads.iter().filter(|a| a.is_active()).count(), 1);
    let snapshot = client
        .usage()
        .latest("act_123")
        .expect("usage should be recorded");
    assert_eq!(snapshot.readings[0].1.acc_id_util_pct, Some(42.0));
}

#[tokio::test]
async fn campaign_statuses_prefer_configured_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/act_123/campaigns"))
        .and(query_param("fields", "id,status,effective_status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "10", "status": "PAUSED", "effective_status": "PAUSED"},
                {"id": "11", "effective_status": "ACTIVE"}
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let statuses = client
        .fetch_campaign_statuses(&creds(), &["10".to_string(), "11".to_string()])
        .await
        .expect("status lookup should succeed");

    assert_eq!(statuses.get("10").map(String::as_str), Some("PAUSED"));
    assert_eq!(statuses.get("11").map(String::as_str), Some("ACTIVE"));
}
