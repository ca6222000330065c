//! Periodic submission sweep
//!
//! Cron-driven scan that re-enters the submission workflow for documents
//! left unfinished by a crash, a failed call or a lost job. Each document
//! burns one submission attempt per sweep pass, bounded by the per-doctype
//! attempt ceiling; documents past the ceiling are left for manual review.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taxbridge_core::ports::{DocumentStore, JobQueue, JobSpec, SettingsStore};
use taxbridge_domain::{Doctype, IntegrationSettings, Result, SalesInvoice};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::PerformanceMetrics;
use crate::remote::orchestrator::resume_job;

use super::error::{SchedulerError, SchedulerResult};

/// Configuration for the submission sweep.
#[derive(Debug, Clone)]
pub struct SubmissionSweepConfig {
    /// Cron expression describing the execution schedule.
    pub cron_expression: String,
    /// Settings records to sweep.
    pub settings_names: Vec<String>,
    /// Timeout applied to a single sweep execution.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for SubmissionSweepConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 */15 * * * *".into(), // every 15 minutes
            settings_names: Vec::new(),
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Submission sweep scheduler with explicit lifecycle management.
pub struct SubmissionSweep {
    scheduler: Option<JobScheduler>,
    config: SubmissionSweepConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    metrics: Arc<PerformanceMetrics>,
    docs: Arc<dyn DocumentStore>,
    jobs: Arc<dyn JobQueue>,
    settings_store: Arc<dyn SettingsStore>,
}

impl SubmissionSweep {
    pub fn new(
        config: SubmissionSweepConfig,
        docs: Arc<dyn DocumentStore>,
        jobs: Arc<dyn JobQueue>,
        settings_store: Arc<dyn SettingsStore>,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            metrics,
            docs,
            jobs,
            settings_store,
        }
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        let start_result = tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?;
        start_result.map_err(|source| SchedulerError::StartFailed(source.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!(scheduler = "submission_sweep", "monitor cancelled");
        });
        self.monitor_handle = Some(handle);

        info!(scheduler = "submission_sweep", "submission sweep started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        let stop_result =
            tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?;
        stop_result.map_err(|source| SchedulerError::StopFailed(source.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|err| SchedulerError::TaskJoinFailed(err.to_string()))?;
        }

        info!(scheduler = "submission_sweep", "submission sweep stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|source| SchedulerError::CreationFailed(source.to_string()))?;

        let cron_expr = self.config.cron_expression.clone();
        let job_timeout = self.config.job_timeout;
        let settings_names = self.config.settings_names.clone();
        let docs = self.docs.clone();
        let jobs = self.jobs.clone();
        let settings_store = self.settings_store.clone();
        let metrics = self.metrics.clone();

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let settings_names = settings_names.clone();
            let docs = docs.clone();
            let jobs = jobs.clone();
            let settings_store = settings_store.clone();
            let metrics = metrics.clone();

            Box::pin(async move {
                metrics.record_call();

                for name in &settings_names {
                    let settings = match settings_store.load(name).await {
                        Ok(settings) => settings,
                        Err(err) => {
                            error!(settings = %name, error = %err, "sweep cannot load settings");
                            metrics.record_error();
                            continue;
                        }
                    };
                    if !settings.is_active {
                        continue;
                    }

                    match tokio::time::timeout(
                        job_timeout,
                        Self::sweep_once(&settings, &docs, &jobs),
                    )
                    .await
                    {
                        Ok(Ok(requeued)) => {
                            debug!(settings = %name, requeued, "sweep pass finished");
                        }
                        Ok(Err(err)) => {
                            metrics.record_error();
                            error!(settings = %name, error = %err, "sweep pass failed");
                        }
                        Err(_) => {
                            metrics.record_timeout();
                            warn!(settings = %name, timeout_secs = job_timeout.as_secs(), "sweep pass timed out");
                        }
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        scheduler
            .add(job_definition)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed(source.to_string()))?;

        debug!(cron = %self.config.cron_expression, "registered submission sweep job");
        Ok(scheduler)
    }

    /// One sweep pass over a settings record. Returns how many documents
    /// were re-entered into the workflow.
    pub async fn sweep_once(
        settings: &IntegrationSettings,
        docs: &Arc<dyn DocumentStore>,
        jobs: &Arc<dyn JobQueue>,
    ) -> Result<usize> {
        if !settings.sales_auto_submission_enabled {
            return Ok(0);
        }

        let since =
            Utc::now() - chrono::Duration::seconds(settings.submission_timeframe_secs as i64);
        let unfinished = docs.list_unfinished_sales_invoices(since).await?;
        let max_attempts = settings.max_attempts_for(Doctype::SalesInvoice);

        let mut requeued = 0_usize;
        for invoice in unfinished {
            if !eligible(&invoice, max_attempts) {
                continue;
            }
            let Some(kind) = resume_job(&invoice) else { continue };

            docs.bump_submission_attempts(&invoice.name).await?;
            jobs.enqueue(JobSpec::new(kind, settings.name.clone())).await?;
            requeued += 1;
        }

        Ok(requeued)
    }
}

fn eligible(invoice: &SalesInvoice, max_attempts: u32) -> bool {
    !invoice.prevent_submission && invoice.submission.submission_attempts < max_attempts
}

impl Drop for SubmissionSweep {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SubmissionSweep dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
