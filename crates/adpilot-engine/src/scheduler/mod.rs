//! Maps rule schedules onto triggers held by an external broker.

pub mod plan;
mod service;

use async_trait::async_trait;
use thiserror::Error;

use adpilot_core::{ScheduleError, StoreError};

pub use plan::{
    belongs_to_rule, earliest, next_fire, next_runs, repeat_interval_secs, trigger_id,
    weekday_trigger_id, TriggerPlan,
};
pub use service::{ReconcileReport, ScheduledRule, Scheduler};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("cron expression '{0}' has no upcoming fire time")]
    NoUpcomingFire(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("trigger broker error: {0}")]
    Broker(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Registers and cancels named recurring triggers. Each trigger calls back
/// into the rule runner with its rule id.
#[async_trait]
pub trait TriggerBroker: Send + Sync {
    /// Registers `plan`, replacing any trigger with the same id.
    async fn register(&self, plan: &TriggerPlan) -> Result<(), SchedulerError>;

    /// Removes a trigger. Returns `false` if no trigger had that id.
    async fn cancel(&self, trigger_id: &str) -> Result<bool, SchedulerError>;

    /// Ids of all registered triggers.
    async fn trigger_ids(&self) -> Result<Vec<String>, SchedulerError>;
}
