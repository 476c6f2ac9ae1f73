use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("ADPILOT_ENV", "development"))?;
    let bind_addr = parse_addr("ADPILOT_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("ADPILOT_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("ADPILOT_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("ADPILOT_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("ADPILOT_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let meta_base_url = or_default("ADPILOT_META_BASE_URL", "https://graph.facebook.com/v21.0");
    let meta_read_timeout_secs = parse_u64("ADPILOT_META_READ_TIMEOUT_SECS", "30")?;
    let meta_write_timeout_secs = parse_u64("ADPILOT_META_WRITE_TIMEOUT_SECS", "45")?;
    let meta_insights_timeout_secs = parse_u64("ADPILOT_META_INSIGHTS_TIMEOUT_SECS", "60")?;
    let meta_read_delay_ms = parse_u64("ADPILOT_META_READ_DELAY_MS", "300")?;
    let meta_write_delay_ms = parse_u64("ADPILOT_META_WRITE_DELAY_MS", "700")?;
    let meta_insights_delay_ms = parse_u64("ADPILOT_META_INSIGHTS_DELAY_MS", "1000")?;
    let meta_page_delay_ms = parse_u64("ADPILOT_META_PAGE_DELAY_MS", "500")?;

    let usage_history_len = parse_usize("ADPILOT_USAGE_HISTORY_LEN", "10")?;
    if usage_history_len < 2 {
        return Err(invalid(
            "ADPILOT_USAGE_HISTORY_LEN",
            "must keep at least 2 readings to compute trends".to_string(),
        ));
    }
    let notify_timeout_secs = parse_u64("ADPILOT_NOTIFY_TIMEOUT_SECS", "10")?;

    let tz_raw = or_default("ADPILOT_DEFAULT_TIMEZONE", "UTC");
    let default_timezone = tz_raw
        .parse::<chrono_tz::Tz>()
        .map_err(|e| invalid("ADPILOT_DEFAULT_TIMEZONE", e.to_string()))?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        meta_base_url,
        meta_read_timeout_secs,
        meta_write_timeout_secs,
        meta_insights_timeout_secs,
        meta_read_delay_ms,
        meta_write_delay_ms,
        meta_insights_delay_ms,
        meta_page_delay_ms,
        usage_history_len,
        notify_timeout_secs,
        default_timezone,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "ADPILOT_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
