mod cli;
mod config;
mod db;
mod errors;
mod external;
mod jobs;
mod logging;
mod models;
mod services;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use crate::cli::{Cli, Mode};
use crate::config::ImporterConfig;
use crate::db::snapshot_store::PgSnapshotStore;
use crate::external::jpx::JpxOptionChainProvider;
use crate::logging::{init_logging, LoggingConfig};
use crate::models::ExpiryBucket;
use crate::services::import_service::{self, ImportReport};
use crate::services::job_scheduler_service::{JobContext, JobSchedulerService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let cli = Cli::parse();
    let config = ImporterConfig::from_env()?;

    let mode = cli.mode();
    tracing::debug!("running in mode {:?}", mode);

    let report = match mode {
        Mode::DryRun(file) => return dry_run(&config, file).await,
        Mode::File(file) => {
            let store = connect(&config).await?;
            import_service::import_from_file(&file, &store)
                .await
                .with_context(|| format!("failed to import {}", file.display()))?
        }
        Mode::Bulk(list) => {
            let store = connect(&config).await?;
            import_service::bulk_import(&list, &store)
                .await
                .with_context(|| format!("failed to bulk import from {}", list.display()))?
        }
        Mode::Web => {
            let source = JpxOptionChainProvider::from_config(&config)?;
            let store = connect(&config).await?;
            import_service::import_from_web(&source, &store)
                .await
                .context("failed to import option chains from the web")?
        }
        Mode::Schedule(schedule) => {
            let schedule = schedule
                .or_else(|| config.import_schedule.clone())
                .context("--schedule needs a cron expression or NKOPM_IMPORT_SCHEDULE")?;
            let source = Arc::new(JpxOptionChainProvider::from_config(&config)?);
            let store = Arc::new(connect(&config).await?);
            return run_scheduled(&schedule, JobContext::new(source, store)).await;
        }
    };

    log_report(&report);
    Ok(())
}

async fn connect(config: &ImporterConfig) -> anyhow::Result<PgSnapshotStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    tracing::info!("✅ Connected to database");
    Ok(PgSnapshotStore::new(pool))
}

async fn dry_run(config: &ImporterConfig, file: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let snapshot = match file {
        Some(file) => import_service::load_snapshot_from_file(&file)
            .await
            .with_context(|| format!("failed to parse {}", file.display()))?,
        None => {
            let source = JpxOptionChainProvider::from_config(config)?;
            import_service::fetch_snapshot(&source, ExpiryBucket::NearbyMonth)
                .await
                .context("failed to fetch the nearby-month option chain")?
        }
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_scheduled(schedule: &str, context: JobContext) -> anyhow::Result<()> {
    let mut scheduler = JobSchedulerService::new(context).await?;
    scheduler.start(schedule).await?;

    tracing::info!("🚀 Scheduled import running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    scheduler.stop().await?;
    Ok(())
}

fn log_report(report: &ImportReport) {
    if report.skipped {
        tracing::info!("Nothing new on the site, no rows written");
    } else {
        tracing::info!(
            "Import finished: {} snapshot(s) saved, {} failed, {} option row(s) inserted",
            report.snapshots_saved,
            report.snapshots_failed,
            report.options_inserted
        );
    }
}
