mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use adpilot_core::RuleStore;
use adpilot_engine::{Notifier, RuleRunner, Scheduler};
use adpilot_meta::{ClientSettings, MetaClient, UsageTracker};
use tokio_cron_scheduler::JobScheduler;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    scheduler::{CronBroker, JobContext},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = adpilot_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = adpilot_db::PoolConfig::from_app_config(&config);
    let pool = adpilot_db::connect_pool(&config.database_url, pool_config).await?;
    adpilot_db::run_migrations(&pool).await?;

    let store: Arc<dyn RuleStore> = Arc::new(adpilot_db::PgStore::new(pool.clone()));
    let usage = Arc::new(UsageTracker::new(config.usage_history_len));
    let meta = Arc::new(MetaClient::new(
        ClientSettings::from_app_config(&config),
        usage,
    )?);
    let notifier = Arc::new(Notifier::new(Duration::from_secs(
        config.notify_timeout_secs,
    ))?);
    let runner = Arc::new(RuleRunner::new(
        Arc::clone(&store),
        meta,
        Some(notifier),
        config.default_timezone,
    ));

    let mut jobs = JobScheduler::new().await?;
    let broker = Arc::new(CronBroker::new(
        jobs.clone(),
        Arc::new(JobContext::new(Arc::clone(&runner))),
    ));
    let rule_scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&broker) as Arc<dyn adpilot_engine::TriggerBroker>,
        config.default_timezone,
    ));
    broker.attach(Arc::clone(&rule_scheduler));

    match rule_scheduler.reconcile_all().await {
        Ok(report) => tracing::info!(
            scheduled = report.scheduled,
            failed = report.failed,
            "rule schedules restored"
        ),
        Err(e) => tracing::warn!(error = %e, "failed to restore rule schedules"),
    }
    jobs.start().await?;

    let app = build_app(AppState {
        pool,
        runner,
        scheduler: rule_scheduler,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "adpilot server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = jobs.shutdown().await {
        tracing::warn!(error = ?e, "job scheduler did not shut down cleanly");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
