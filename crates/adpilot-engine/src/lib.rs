//! Rule evaluation and execution against the ad platform.

pub mod actions;
pub mod evaluator;
pub mod grouping;
pub mod metrics;
pub mod notify;
pub mod runner;
pub mod scheduler;
pub mod scope;
pub mod signals;

pub use actions::{plan_budget, ActionExecutor, ActionResult, BudgetPlan};
pub use evaluator::{evaluate, Evaluation, ItemContext, EQUALITY_EPSILON};
pub use grouping::{group_by_time_range, TimeRangeGroup};
pub use notify::Notifier;
pub use runner::{Decision, RuleRunner, RunError, RunSummary, Stage};
pub use scheduler::{
    ReconcileReport, ScheduledRule, Scheduler, SchedulerError, TriggerBroker, TriggerPlan,
};
pub use signals::WinningDays;
