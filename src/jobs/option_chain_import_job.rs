//! Option Chain Import Job
//!
//! Runs the web import once per scheduler tick. The site refreshes every few
//! minutes during trading hours; ticks that find nothing new are cheap (one
//! page fetch, no writes).

use tracing::info;

use crate::errors::AppError;
use crate::services::import_service;
use crate::services::job_scheduler_service::{JobContext, JobResult};

pub async fn import_option_chains(ctx: JobContext) -> Result<JobResult, AppError> {
    let report = import_service::import_from_web(ctx.source.as_ref(), ctx.store.as_ref()).await?;

    if report.skipped {
        info!("Option chain unchanged, nothing imported");
    }

    Ok(JobResult {
        items_processed: report.snapshots_saved as i32,
        items_failed: report.snapshots_failed as i32,
    })
}
