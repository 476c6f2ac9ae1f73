//! Schedule maintenance command handlers.

use adpilot_core::Schedule;
use adpilot_engine::scheduler::next_runs;
use chrono::Utc;
use chrono_tz::Tz;

/// What `normalize-schedules` does with one stored value.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Normalization {
    /// Already canonical.
    Unchanged,
    /// Rewrite to the canonical JSON.
    Rewrite(String),
    /// No schedule; store NULL.
    Clear,
    /// Unparseable; left alone.
    Invalid(String),
}

pub(crate) fn normalize(raw: &str, default_tz: Tz) -> Normalization {
    match Schedule::parse_stored(raw, default_tz) {
        Ok(Some(schedule)) => {
            let canonical = schedule.to_stored();
            if canonical == raw {
                Normalization::Unchanged
            } else {
                Normalization::Rewrite(canonical)
            }
        }
        Ok(None) => Normalization::Clear,
        Err(e) => Normalization::Invalid(e.to_string()),
    }
}

/// Rewrites every rule's stored schedule into canonical form.
///
/// Invalid values are reported and left untouched so an operator can fix
/// them by hand.
///
/// # Errors
///
/// Returns an error if listing or updating rules fails.
pub(crate) async fn run_normalize(
    pool: &sqlx::PgPool,
    default_tz: Tz,
    dry_run: bool,
) -> anyhow::Result<()> {
    let rules = adpilot_db::list_rules(pool).await?;

    let mut rewritten = 0usize;
    let mut invalid = 0usize;
    for rule in &rules {
        let Some(raw) = rule.schedule.as_deref() else {
            continue;
        };

        let target = match normalize(raw, default_tz) {
            Normalization::Unchanged => continue,
            Normalization::Invalid(reason) => {
                invalid += 1;
                println!("rule {:<6} INVALID  {raw:?}: {reason}", rule.id);
                continue;
            }
            Normalization::Clear => None,
            Normalization::Rewrite(canonical) => Some(canonical),
        };

        println!(
            "rule {:<6} {raw:?} -> {}",
            rule.id,
            target.as_deref().unwrap_or("NULL")
        );
        if !dry_run {
            adpilot_db::set_schedule(pool, rule.id, target.as_deref()).await?;
        }
        rewritten += 1;
    }

    if dry_run {
        println!("[dry-run] {rewritten} schedule(s) would be rewritten, {invalid} invalid");
    } else {
        tracing::info!(rewritten, invalid, "schedules normalized");
        println!("{rewritten} schedule(s) rewritten, {invalid} invalid");
    }
    Ok(())
}

/// Prints the next `count` fire times of a rule's schedule in UTC and in
/// the schedule's own timezone.
///
/// # Errors
///
/// Returns an error if the rule cannot be loaded or its schedule is invalid.
pub(crate) async fn run_next_runs(
    pool: &sqlx::PgPool,
    default_tz: Tz,
    rule_id: i64,
    count: usize,
) -> anyhow::Result<()> {
    let rule = adpilot_db::get_rule(pool, rule_id)
        .await
        .map_err(|e| anyhow::anyhow!("rule {rule_id}: {e}"))?;

    let Some(schedule) = rule
        .schedule
        .as_deref()
        .map(|raw| Schedule::parse_stored(raw, default_tz))
        .transpose()?
        .flatten()
    else {
        println!("rule {rule_id} has no schedule; it only runs on demand");
        return Ok(());
    };

    if !rule.enabled {
        println!("rule {rule_id} is disabled; these runs will not fire until it is enabled");
    }
    println!("schedule: {schedule}");

    let tz = schedule.timezone();
    for fire in next_runs(&schedule, Utc::now(), count)? {
        println!(
            "{}  ({})",
            fire.format("%Y-%m-%d %H:%M UTC"),
            fire.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z")
        );
    }
    Ok(())
}
