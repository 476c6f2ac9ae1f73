mod rules;
mod schedules;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "adpilot-cli")]
#[command(about = "adpilot operator commands")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a rule once against live account data and log the outcome
    Run {
        /// Rule id
        #[arg(long)]
        rule: i64,
    },
    /// Show a rule's run logs, newest first
    Logs {
        /// Rule id
        #[arg(long)]
        rule: i64,
        /// Maximum number of entries to show
        #[arg(long, default_value_t = adpilot_db::DEFAULT_LOG_LIMIT)]
        limit: i64,
        /// Print each entry's diagnostic details
        #[arg(long)]
        details: bool,
    },
    /// Rewrite stored schedules in their canonical JSON form
    NormalizeSchedules {
        /// Report what would change without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Preview a rule's upcoming scheduled runs
    NextRuns {
        /// Rule id
        #[arg(long)]
        rule: i64,
        /// Number of fire times to show
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("adpilot-cli: no command given; see --help");
        return Ok(());
    };

    let config = adpilot_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adpilot_db::PoolConfig::from_app_config(&config);
    let pool = adpilot_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Run { rule } => rules::run_rule(&pool, &config, rule).await,
        Commands::Logs {
            rule,
            limit,
            details,
        } => rules::run_logs(&pool, rule, limit, details).await,
        Commands::NormalizeSchedules { dry_run } => {
            schedules::run_normalize(&pool, config.default_timezone, dry_run).await
        }
        Commands::NextRuns { rule, count } => {
            schedules::run_next_runs(&pool, config.default_timezone, rule, count).await
        }
    }
}

#[cfg(test)]
mod tests;
