//! Cron trigger for the full pipeline.
//!
//! Each trigger runs the whole graph with fresh stage state. A trigger that
//! fires while the previous run is still going is skipped.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::pipeline::{self, PipelineContext};

/// Builds and starts the scheduler with the pipeline job registered.
///
/// The returned handle must be kept alive; dropping it stops the job.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    context: Arc<PipelineContext>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let schedule = context.config.schedule.clone();
    let in_flight = Arc::new(Mutex::new(()));

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let context = Arc::clone(&context);
        let in_flight = Arc::clone(&in_flight);

        Box::pin(async move {
            let Ok(_running) = in_flight.try_lock() else {
                tracing::warn!("scheduler: previous pipeline run still in progress; skipping trigger");
                return;
            };
            tracing::info!("scheduler: starting pipeline run");
            match pipeline::run_once(&context).await {
                Ok(report) => {
                    for stage in &report.stages {
                        tracing::info!(stage = stage.name, state = %stage.state, "scheduler: stage result");
                    }
                    if !report.succeeded() {
                        tracing::error!("scheduler: pipeline run did not complete successfully");
                    }
                }
                Err(e) => tracing::error!(error = %e, "scheduler: pipeline run could not start"),
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(schedule = %schedule, "scheduler: pipeline job registered");
    Ok(scheduler)
}

/// Run the scheduler until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Fails if the scheduler cannot be built or shut down cleanly.
pub async fn run_schedule(context: Arc<PipelineContext>) -> anyhow::Result<()> {
    let mut scheduler = build_scheduler(context).await?;
    shutdown_signal().await?;
    scheduler.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {},
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("received shutdown signal, stopping scheduler");
    Ok(())
}
