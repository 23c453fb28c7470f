//! StackForge Background Worker
//!
//! Handles scheduled jobs including:
//! - Billing reconciliation (every 15 minutes): subscription sync against
//!   each configured backend, seat-overage billing, usage-based billing sync
//! - Health check heartbeat (every 5 minutes)
//! - Request-log retention cleanup (daily at 3:00 AM UTC)

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use stackforge_metering::{MeteringService, PgRequestLog, ReconcileReport, RequestLog};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Rate-limit log rows older than this are dead weight; the sliding
/// window only ever looks back one hour.
const REQUEST_LOG_RETENTION_DAYS: i64 = 7;

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// Log the outcome of one reconciliation pass
fn log_reconcile_report(report: &ReconcileReport) {
    info!(
        tasks = report.tasks.len(),
        failed = report.failed_tasks(),
        changes = report.total_changes(),
        "Reconciliation pass complete"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting StackForge Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Wire the metering engine; backends without credentials are skipped
    let metering = Arc::new(MeteringService::from_env(pool.clone()));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Billing reconciliation every 15 minutes
    // Each pass runs its tasks in isolation; a failed task is retried
    // implicitly on the next tick.
    let reconcile_metering = metering.clone();
    scheduler
        .add(Job::new_async("0 */15 * * * *", move |_uuid, _l| {
            let metering = reconcile_metering.clone();
            Box::pin(async move {
                info!("Running billing reconciliation pass");
                let report = metering.reconciler.run().await;
                log_reconcile_report(&report);
            })
        })?)
        .await?;
    info!("Scheduled: Billing reconciliation (every 15 minutes)");

    // Job 2: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Job 3: Request-log retention cleanup (daily at 3:00 AM UTC)
    let retention_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let log = PgRequestLog::new(retention_pool.clone());
            Box::pin(async move {
                let cutoff = time::OffsetDateTime::now_utc()
                    - time::Duration::days(REQUEST_LOG_RETENTION_DAYS);
                match log.purge_before(cutoff).await {
                    Ok(removed) => info!(removed, "Request-log cleanup complete"),
                    Err(e) => error!(error = %e, "Request-log cleanup failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Request-log cleanup (daily at 3:00 UTC)");

    // Start the scheduler
    scheduler.start().await?;
    info!("Worker started, all jobs scheduled");

    // Keep the worker running
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
}
