use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::db::snapshot_store::SnapshotStore;
use crate::errors::AppError;
use crate::external::option_chain_source::OptionChainSource;
use crate::jobs::option_chain_import_job;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub source: Arc<dyn OptionChainSource>,
    pub store: Arc<dyn SnapshotStore>,
    /// Held for the duration of a run; a tick that finds it taken is skipped.
    pub in_flight: Arc<Mutex<()>>,
}

impl JobContext {
    pub fn new(source: Arc<dyn OptionChainSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            in_flight: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: i32,
    pub items_failed: i32,
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Schedules the option chain import and starts ticking.
    ///
    /// `schedule` uses tokio-cron-scheduler's six fields
    /// (sec min hour day month weekday).
    pub async fn start(&mut self, schedule: &str) -> Result<(), AppError> {
        info!("Starting job scheduler...");

        self.schedule_job(
            schedule,
            "import_option_chains",
            option_chain_import_job::import_option_chains,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("Job scheduler started");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("Job scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::Validation(format!("Invalid schedule {:?} for {}: {}", schedule, job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("Scheduled: {} [cron: {}]", job_name, schedule);
        Ok(())
    }
}

/// Runs one tick of a job unless the previous tick is still going. Returns
/// `None` when the tick was skipped.
pub(crate) async fn execute_job<F, Fut>(
    job_name: &str,
    context: JobContext,
    job_fn: Arc<F>,
) -> Option<Result<JobResult, String>>
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, AppError>>,
{
    let in_flight = context.in_flight.clone();
    let Ok(_guard) = in_flight.try_lock() else {
        warn!("Skipping job {}: previous run still in progress", job_name);
        return None;
    };

    info!("Starting job: {}", job_name);
    let started_at = Utc::now();

    let result = job_fn(context).await;

    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "Job completed: {} (processed: {}, failed: {}, duration: {}ms)",
                job_name, job_result.items_processed, job_result.items_failed, duration_ms
            );
            Some(Ok(job_result))
        }
        Err(e) => {
            error!("Job failed: {} - {} (duration: {}ms)", job_name, e, duration_ms);
            Some(Err(e.to_string()))
        }
    }
}
