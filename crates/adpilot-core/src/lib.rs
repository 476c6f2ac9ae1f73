pub mod app_config;
pub mod config;
pub mod rules;
pub mod schedule;
pub mod store;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use rules::{
    parse_actions, ActionKind, ActionSpec, BudgetDirection, ConditionClause, ConditionField,
    CredentialOverride, ExpectedValue, Level, Metric, Operator, Rule, RuleConditions,
    RuleDocumentError, ScopeFilters, SpecialToken, TimeRange, TimeUnit, ValueBase,
    MAX_TIME_RANGE_AMOUNT,
};
pub use schedule::{DailyTime, Schedule, ScheduleError};
pub use store::{AccountRecord, RuleRecord, RuleStore, RunStatus, StoreError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
