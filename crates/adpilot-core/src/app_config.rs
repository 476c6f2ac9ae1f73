use std::net::SocketAddr;

use chrono_tz::Tz;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub meta_base_url: String,
    pub meta_read_timeout_secs: u64,
    pub meta_write_timeout_secs: u64,
    pub meta_insights_timeout_secs: u64,
    pub meta_read_delay_ms: u64,
    pub meta_write_delay_ms: u64,
    pub meta_insights_delay_ms: u64,
    pub meta_page_delay_ms: u64,
    /// Readings kept per ad account by the usage tracker.
    pub usage_history_len: usize,
    pub notify_timeout_secs: u64,
    /// Timezone applied to schedules that do not name one.
    pub default_timezone: Tz,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("meta_base_url", &self.meta_base_url)
            .field("meta_read_timeout_secs", &self.meta_read_timeout_secs)
            .field("meta_write_timeout_secs", &self.meta_write_timeout_secs)
            .field(
                "meta_insights_timeout_secs",
                &self.meta_insights_timeout_secs,
            )
            .field("meta_read_delay_ms", &self.meta_read_delay_ms)
            .field("meta_write_delay_ms", &self.meta_write_delay_ms)
            .field("meta_insights_delay_ms", &self.meta_insights_delay_ms)
            .field("meta_page_delay_ms", &self.meta_page_delay_ms)
            .field("usage_history_len", &self.usage_history_len)
            .field("notify_timeout_secs", &self.notify_timeout_secs)
            .field("default_timezone", &self.default_timezone.name())
            .finish()
    }
}
