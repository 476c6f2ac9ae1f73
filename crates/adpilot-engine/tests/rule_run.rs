//! End-to-end rule runs against a mocked Marketing API and an in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use adpilot_core::{AccountRecord, RuleRecord, RuleStore, RunStatus, StoreError};
use adpilot_engine::{Decision, RuleRunner, RunError};
use adpilot_meta::{ClientSettings, MetaClient, UsageTracker};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone)]
struct LoggedRun {
    rule_id: i64,
    status: RunStatus,
    message: String,
    details: Value,
}

#[derive(Default)]
struct MemoryStore {
    rules: Mutex<HashMap<i64, RuleRecord>>,
    accounts: Mutex<HashMap<i64, AccountRecord>>,
    logs: Mutex<Vec<LoggedRun>>,
    account_lookup_fails: AtomicBool,
}

impl MemoryStore {
    fn logs(&self) -> Vec<LoggedRun> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn rule(&self, id: i64) -> Result<Option<RuleRecord>, StoreError> {
        Ok(self.rules.lock().unwrap().get(&id).cloned())
    }

    async fn account(&self, id: i64) -> Result<Option<AccountRecord>, StoreError> {
        if self.account_lookup_fails.load(Ordering::SeqCst) {
            return Err(StoreError::new(std::io::Error::other("connection reset")));
        }
        Ok(self.accounts.lock().unwrap().get(&id).cloned())
    }

    async fn scheduled_rules(&self) -> Result<Vec<RuleRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn append_log(
        &self,
        rule_id: i64,
        status: RunStatus,
        message: &str,
        details: &Value,
    ) -> Result<i64, StoreError> {
        let mut logs = self.logs.lock().unwrap();
        logs.push(LoggedRun {
            rule_id,
            status,
            message: message.to_string(),
            details: details.clone(),
        });
        Ok(i64::try_from(logs.len()).unwrap())
    }

    async fn set_next_run(
        &self,
        _rule_id: i64,
        _next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn set_last_run(&self, _rule_id: i64, _ran_at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(())
    }
}

fn account(meta_account_id: Option<&str>) -> AccountRecord {
    AccountRecord {
        id: 1,
        name: "Main account".into(),
        meta_account_id: meta_account_id.map(Into::into),
        meta_access_token: Some("test-token".into()),
        notification_webhook_url: None,
    }
}

fn rule(id: i64, conditions: Value, actions: Value) -> RuleRecord {
    RuleRecord {
        id,
        account_id: 1,
        name: format!("rule {id}"),
        description: None,
        enabled: true,
        schedule: None,
        conditions,
        actions,
        meta_account_id: None,
        meta_access_token: None,
        last_run_at: None,
        next_run_at: None,
    }
}

fn runner(server_uri: &str, store: &Arc<MemoryStore>) -> RuleRunner {
    let settings = ClientSettings::default()
        .with_base_url(server_uri)
        .without_delays();
    let meta = MetaClient::new(settings, Arc::new(UsageTracker::new(10)))
        .expect("client construction should not fail");
    RuleRunner::new(store.clone(), Arc::new(meta), None, Tz::UTC)
}

fn store_with(records: Vec<RuleRecord>, account: AccountRecord) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    for r in records {
        store.rules.lock().unwrap().insert(r.id, r);
    }
    store.accounts.lock().unwrap().insert(account.id, account);
    store
}

async fn mount_three_adsets(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/act_123/adsets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "a1", "name": "Cold", "status": "ACTIVE", "campaign_id": "c1", "daily_budget": "10000"},
                {"id": "a2", "name": "Warm", "status": "ACTIVE", "campaign_id": "c1", "daily_budget": "10000"},
                {"id": "a3", "name": "Hot", "status": "ACTIVE", "campaign_id": "c2", "daily_budget": "10000"}
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_spend_insights(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/act_123/insights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"adset_id": "a1", "spend": "50.00"},
                {"adset_id": "a2", "spend": "150.00"},
                {"adset_id": "a3", "spend": "200.00"}
            ]
        })))
        .mount(server)
        .await;
}

fn spend_rule(id: i64, actions: Value) -> RuleRecord {
    rule(
        id,
        json!({
            "rule_level": "ad_set",
            "time_range": {"unit": "days", "amount": 7},
            "conditions": [{"field": "spend", "operator": ">", "value": 100}]
        }),
        actions,
    )
}

#[tokio::test]
async fn spend_rule_pauses_exactly_the_matching_ad_sets() {
    let server = MockServer::start().await;
    mount_three_adsets(&server).await;
    mount_spend_insights(&server).await;

    for (id, calls) in [("a1", 0), ("a2", 1), ("a3", 1)] {
        Mock::given(method("POST"))
            .and(path(format!("/{id}")))
            .and(body_string_contains("status=PAUSED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(calls)
            .mount(&server)
            .await;
    }

    let store = store_with(
        vec![spend_rule(
            10,
            json!({"actions": [{"type": "set_status", "status": "PAUSED"}]}),
        )],
        account(Some("123")),
    );
    let summary = runner(&server.uri(), &store).run(10).await.expect("run succeeds");

    assert_eq!(summary.decision, Decision::Proceed);
    assert_eq!(summary.items_checked, 3);
    assert_eq!(summary.items_meeting_conditions, 2);
    assert_eq!(
        summary.message,
        "Executed actions on 2/2 item(s). 2 item(s) met all conditions."
    );

    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].rule_id, 10);
    assert_eq!(logs[0].status, RunStatus::Success);

    let details = &logs[0].details;
    assert_eq!(details["stage"], "done");
    assert_eq!(details["decision"], "proceed");
    assert_eq!(details["data_fetch"]["total_items"], 3);
    assert_eq!(details["insights_summary"]["unique_time_ranges"], 1);
    let matched: Vec<&str> = details["items_meeting_conditions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(matched, vec!["a2", "a3"]);

    let first = &details["evaluations"][0]["conditions_evaluated"][0];
    assert_eq!(first["field"], "spend");
    assert_eq!(first["actual_value"], 50.0);
    assert_eq!(first["passed"], false);
    assert_eq!(first["time_range_used"], "global");
}

#[tokio::test]
async fn no_match_skips_without_mutations() {
    let server = MockServer::start().await;
    mount_three_adsets(&server).await;
    Mock::given(method("GET"))
        .and(path("/act_123/insights"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_with(
        vec![spend_rule(
            11,
            json!({"actions": [{"type": "set_status", "status": "PAUSED"}]}),
        )],
        account(Some("123")),
    );
    let summary = runner(&server.uri(), &store).run(11).await.unwrap();

    assert_eq!(summary.decision, Decision::Skip);
    assert_eq!(summary.message, "Test completed: 0 item(s) meet all conditions");
    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Skipped);
}

#[tokio::test]
async fn budget_increase_over_cap_is_reported_not_applied() {
    let server = MockServer::start().await;
    mount_three_adsets(&server).await;
    mount_spend_insights(&server).await;
    Mock::given(method("GET"))
        .and(path("/a3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a3", "daily_budget": "10000"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut record = rule(
        12,
        json!({
            "rule_level": "ad_set",
            "ids": "a3",
            "conditions": [{"field": "spend", "operator": ">", "value": 100}]
        }),
        json!({"actions": [{
            "type": "adjust_daily_budget", "direction": "increase",
            "percent": 50, "max_cap": 140
        }]}),
    );
    record.meta_account_id = Some("act_123".into());
    let store = store_with(vec![record], account(None));

    let summary = runner(&server.uri(), &store).run(12).await.unwrap();
    assert_eq!(summary.decision, Decision::Proceed);
    assert_eq!(summary.message, "Executed actions on 0/1 item(s). 1 item(s) met all conditions.");

    let action = &summary.log_details["actions_executed"][0];
    assert_eq!(action["success"], false);
    assert_eq!(action["old_budget"], 100.0);
    assert_eq!(action["new_budget"], 100.0);
    assert!(action["message"].as_str().unwrap().contains("exceed max cap"));
}

#[tokio::test]
async fn rate_limit_is_logged_with_stage_and_returned() {
    let server = MockServer::start().await;
    mount_three_adsets(&server).await;
    Mock::given(method("GET"))
        .and(path("/act_123/insights"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"message": "User request limit reached", "code": 17}
        })))
        .mount(&server)
        .await;

    let store = store_with(
        vec![spend_rule(13, json!({"actions": [{"type": "send_notification"}]}))],
        account(Some("123")),
    );
    let err = runner(&server.uri(), &store).run(13).await.unwrap_err();
    assert!(matches!(err, RunError::RateLimited(_)), "{err:?}");

    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Error);
    assert!(logs[0].message.starts_with("Error testing rule: "));
    assert_eq!(logs[0].details["stage"], "insights_gathering");
    assert!(logs[0].details["error"].as_str().unwrap().contains("rate limit"));
    assert_eq!(logs[0].details["data_fetch"]["total_items"], 3);
}

#[tokio::test]
async fn disabled_rule_logs_skip_without_fetching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut record = spend_rule(14, json!({"actions": [{"type": "send_notification"}]}));
    record.enabled = false;
    let store = store_with(vec![record], account(Some("123")));

    let summary = runner(&server.uri(), &store).run(14).await.unwrap();
    assert_eq!(summary.decision, Decision::Disabled);
    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Skipped);
    assert_eq!(logs[0].message, "Rule is disabled");
}

#[tokio::test]
async fn missing_credentials_are_a_configuration_error() {
    let server = MockServer::start().await;
    let store = store_with(
        vec![spend_rule(15, json!({"actions": [{"type": "send_notification"}]}))],
        account(None),
    );

    let err = runner(&server.uri(), &store).run(15).await.unwrap_err();
    assert!(matches!(err, RunError::Configuration(_)));
    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Error);
    assert_eq!(logs[0].message, "Meta account ID or access token missing");
}

#[tokio::test]
async fn unknown_rule_writes_no_log() {
    let server = MockServer::start().await;
    let store = store_with(Vec::new(), account(Some("123")));

    let err = runner(&server.uri(), &store).run(99).await.unwrap_err();
    assert!(matches!(err, RunError::Configuration(_)));
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn store_failure_on_account_lookup_is_logged_by_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = store_with(
        vec![spend_rule(16, json!({"actions": [{"type": "send_notification"}]}))],
        account(Some("123")),
    );
    store.account_lookup_fails.store(true, Ordering::SeqCst);

    let err = runner(&server.uri(), &store).run(16).await.unwrap_err();
    assert!(matches!(err, RunError::Store(_)));
    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].rule_id, 16);
    assert_eq!(logs[0].status, RunStatus::Error);
    assert!(logs[0].message.contains("connection reset"));
}
