use std::sync::Arc;

use adpilot_core::{RuleRecord, RuleStore, Schedule};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::plan::{self, TriggerPlan};
use super::{SchedulerError, TriggerBroker};

/// Triggers registered for one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledRule {
    pub rule_id: i64,
    pub triggers: Vec<TriggerPlan>,
    pub next_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scheduled: usize,
    pub failed: usize,
}

/// Keeps broker triggers and each rule's `next_run_at` in step with the
/// rule's schedule.
pub struct Scheduler {
    store: Arc<dyn RuleStore>,
    broker: Arc<dyn TriggerBroker>,
    default_tz: Tz,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, broker: Arc<dyn TriggerBroker>, default_tz: Tz) -> Self {
        Self {
            store,
            broker,
            default_tz,
        }
    }

    fn schedule_of(&self, record: &RuleRecord) -> Result<Option<Schedule>, SchedulerError> {
        if !record.enabled {
            return Ok(None);
        }
        match record.schedule.as_deref() {
            Some(raw) => Ok(Schedule::parse_stored(raw, self.default_tz)?),
            None => Ok(None),
        }
    }

    /// Replaces the rule's triggers with ones derived from its current
    /// schedule and stores the earliest next fire.
    ///
    /// A disabled rule or one without a schedule ends up with no triggers
    /// and a cleared `next_run_at`; `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] for an invalid schedule or a broker or
    /// store failure. Existing triggers have already been removed by then.
    pub async fn schedule(
        &self,
        record: &RuleRecord,
    ) -> Result<Option<ScheduledRule>, SchedulerError> {
        self.unschedule(record.id).await?;

        let Some(schedule) = self.schedule_of(record)? else {
            self.store.set_next_run(record.id, None).await?;
            tracing::info!(rule_id = record.id, "rule has no active schedule");
            return Ok(None);
        };

        let triggers = plan::plan(record.id, &schedule, Utc::now())?;
        for trigger in &triggers {
            self.broker.register(trigger).await?;
            tracing::info!(
                rule_id = record.id,
                trigger = %trigger.id,
                cron = %trigger.cron,
                timezone = %trigger.timezone,
                next_fire = %trigger.next_fire,
                interval_secs = trigger.repeat_interval_secs,
                "trigger registered"
            );
        }

        let next_run_at = plan::earliest(&triggers);
        self.store.set_next_run(record.id, next_run_at).await?;

        Ok(Some(ScheduledRule {
            rule_id: record.id,
            triggers,
            next_run_at,
        }))
    }

    /// Removes every trigger of `rule_id`, weekday variants included.
    /// Returns how many were removed; zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Broker`] if the broker cannot list or cancel.
    pub async fn unschedule(&self, rule_id: i64) -> Result<usize, SchedulerError> {
        let ids: Vec<String> = self
            .broker
            .trigger_ids()
            .await?
            .into_iter()
            .filter(|id| plan::belongs_to_rule(id, rule_id))
            .collect();

        let mut removed = 0;
        for id in &ids {
            if self.broker.cancel(id).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(rule_id, removed, "triggers cancelled");
        }
        Ok(removed)
    }

    /// Schedules every enabled rule that has a schedule. A rule that fails is
    /// logged and counted; the rest still run.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if the rules cannot be listed.
    pub async fn reconcile_all(&self) -> Result<ReconcileReport, SchedulerError> {
        let records = self.store.scheduled_rules().await?;
        let mut report = ReconcileReport::default();

        for record in &records {
            match self.schedule(record).await {
                Ok(Some(_)) => report.scheduled += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(rule_id = record.id, error = %e, "failed to schedule rule");
                }
            }
        }

        tracing::info!(
            scheduled = report.scheduled,
            failed = report.failed,
            "schedules reconciled"
        );
        Ok(report)
    }

    /// Recomputes and stores `next_run_at` without touching triggers.
    /// Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] for an invalid schedule or a store failure.
    pub async fn refresh_next_run(
        &self,
        record: &RuleRecord,
    ) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let next_run_at = match self.schedule_of(record)? {
            Some(schedule) => plan::earliest(&plan::plan(record.id, &schedule, Utc::now())?),
            None => None,
        };
        self.store.set_next_run(record.id, next_run_at).await?;
        Ok(next_run_at)
    }

    /// Bookkeeping after a triggered run, whatever its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if the store cannot be updated.
    pub async fn record_run(
        &self,
        rule_id: i64,
        fired_at: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        self.store.set_last_run(rule_id, fired_at).await?;
        match self.store.rule(rule_id).await? {
            Some(record) => self.refresh_next_run(&record).await,
            None => Ok(None),
        }
    }
}
