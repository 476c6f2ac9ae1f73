//! Background rule triggers.
//!
//! [`CronBroker`] backs the engine's [`TriggerBroker`] with a
//! [`JobScheduler`]. Each registered trigger becomes one cron job that runs
//! its rule and then records the run.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use adpilot_engine::{RuleRunner, Scheduler, SchedulerError, TriggerBroker, TriggerPlan};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// What a fired job needs. The scheduler is attached after construction
/// because it owns the broker that owns this context.
pub struct JobContext {
    runner: Arc<RuleRunner>,
    scheduler: OnceLock<Arc<Scheduler>>,
}

impl JobContext {
    #[must_use]
    pub fn new(runner: Arc<RuleRunner>) -> Self {
        Self {
            runner,
            scheduler: OnceLock::new(),
        }
    }

    /// Runs the rule and records the fire. Failures are logged, never
    /// propagated into the job scheduler.
    async fn fire(&self, rule_id: i64, trigger_id: &str) {
        let fired_at = Utc::now();
        tracing::info!(rule_id, trigger = trigger_id, "scheduler: trigger fired");

        match self.runner.run(rule_id).await {
            Ok(summary) => tracing::info!(
                rule_id,
                log_id = summary.log_id,
                decision = summary.decision.as_str(),
                items_checked = summary.items_checked,
                "scheduler: rule run complete"
            ),
            Err(e) => tracing::error!(rule_id, error = %e, "scheduler: rule run failed"),
        }

        let Some(scheduler) = self.scheduler.get() else {
            tracing::warn!(rule_id, "scheduler: not attached; run not recorded");
            return;
        };
        match scheduler.record_run(rule_id, fired_at).await {
            Ok(next_run_at) => {
                tracing::debug!(rule_id, next_run_at = ?next_run_at, "scheduler: run recorded");
            }
            Err(e) => tracing::error!(rule_id, error = %e, "scheduler: failed to record run"),
        }
    }
}

pub struct CronBroker {
    jobs: JobScheduler,
    handles: Mutex<HashMap<String, Uuid>>,
    context: Arc<JobContext>,
}

impl CronBroker {
    #[must_use]
    pub fn new(jobs: JobScheduler, context: Arc<JobContext>) -> Self {
        Self {
            jobs,
            handles: Mutex::new(HashMap::new()),
            context,
        }
    }

    /// Hands fired jobs the scheduler for run bookkeeping. Only the first
    /// call has an effect.
    pub fn attach(&self, scheduler: Arc<Scheduler>) {
        if self.context.scheduler.set(scheduler).is_err() {
            tracing::warn!("scheduler: already attached");
        }
    }

    fn build_job(&self, plan: &TriggerPlan) -> Result<Job, SchedulerError> {
        let context = Arc::clone(&self.context);
        let rule_id = plan.rule_id;
        let trigger_id = Arc::new(plan.id.clone());

        Job::new_async_tz(seconds_cron(&plan.cron), plan.timezone, move |_uuid, _lock| {
            let context = Arc::clone(&context);
            let trigger_id = Arc::clone(&trigger_id);
            Box::pin(async move {
                context.fire(rule_id, &trigger_id).await;
            })
        })
        .map_err(|e| SchedulerError::Broker(format!("{e:?}")))
    }
}

/// Five-field cron to the six-field form the job scheduler expects,
/// firing at second zero.
fn seconds_cron(expression: &str) -> String {
    format!("0 {}", expression.trim())
}

#[async_trait]
impl TriggerBroker for CronBroker {
    async fn register(&self, plan: &TriggerPlan) -> Result<(), SchedulerError> {
        let job = self.build_job(plan)?;
        let mut handles = self.handles.lock().await;

        if let Some(previous) = handles.remove(&plan.id) {
            self.jobs
                .remove(&previous)
                .await
                .map_err(|e| SchedulerError::Broker(format!("{e:?}")))?;
        }

        let job_id = self
            .jobs
            .add(job)
            .await
            .map_err(|e| SchedulerError::Broker(format!("{e:?}")))?;
        handles.insert(plan.id.clone(), job_id);
        Ok(())
    }

    async fn cancel(&self, trigger_id: &str) -> Result<bool, SchedulerError> {
        let mut handles = self.handles.lock().await;
        let Some(job_id) = handles.remove(trigger_id) else {
            return Ok(false);
        };
        self.jobs
            .remove(&job_id)
            .await
            .map_err(|e| SchedulerError::Broker(format!("{e:?}")))?;
        Ok(true)
    }

    async fn trigger_ids(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.handles.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::seconds_cron;

    #[test]
    fn seconds_cron_prepends_zero_seconds() {
        assert_eq!(seconds_cron("30 9 * * 1"), "0 30 9 * * 1");
        assert_eq!(seconds_cron(" 0 */4 * * * "), "0 0 */4 * * *");
    }
}
