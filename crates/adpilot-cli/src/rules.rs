//! Rule run and log command handlers.

use std::sync::Arc;
use std::time::Duration;

use adpilot_core::{AppConfig, RuleStore};
use adpilot_engine::{Notifier, RuleRunner};
use adpilot_meta::{ClientSettings, MetaClient, UsageTracker};

/// Runs one rule and prints its summary. The run is logged exactly as a
/// scheduled run would be.
///
/// # Errors
///
/// Returns an error if the rule does not exist, the clients cannot be
/// built, or the run fails.
pub(crate) async fn run_rule(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    rule_id: i64,
) -> anyhow::Result<()> {
    let rule = adpilot_db::get_rule(pool, rule_id)
        .await
        .map_err(|e| anyhow::anyhow!("rule {rule_id}: {e}"))?;

    let store: Arc<dyn RuleStore> = Arc::new(adpilot_db::PgStore::new(pool.clone()));
    let meta = MetaClient::new(
        ClientSettings::from_app_config(config),
        Arc::new(UsageTracker::new(config.usage_history_len)),
    )?;
    let notifier = Notifier::new(Duration::from_secs(config.notify_timeout_secs))?;
    let runner = RuleRunner::new(
        store,
        Arc::new(meta),
        Some(Arc::new(notifier)),
        config.default_timezone,
    );

    println!("running rule {} ({})", rule.id, rule.name);
    let summary = runner.run(rule_id).await?;

    println!("decision:        {}", summary.decision.as_str());
    println!("items checked:   {}", summary.items_checked);
    println!("items matched:   {}", summary.items_meeting_conditions);
    println!("log id:          {}", summary.log_id);
    println!("{}", summary.message);
    Ok(())
}

/// Prints a rule's most recent log entries.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_logs(
    pool: &sqlx::PgPool,
    rule_id: i64,
    limit: i64,
    details: bool,
) -> anyhow::Result<()> {
    let logs = adpilot_db::list_rule_logs(pool, rule_id, limit.max(1), 0).await?;

    if logs.is_empty() {
        println!("no logs for rule {rule_id}");
        return Ok(());
    }

    println!("{:<8}{:<22}{:<10}MESSAGE", "ID", "CREATED", "STATUS");
    for log in &logs {
        println!(
            "{:<8}{:<22}{:<10}{}",
            log.id,
            log.created_at.format("%Y-%m-%d %H:%M:%S"),
            log.status,
            truncate(&log.message, 80)
        );
        if details {
            println!("{}", serde_json::to_string_pretty(&log.details)?);
        }
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
