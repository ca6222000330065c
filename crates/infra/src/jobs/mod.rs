//! In-process background job queue and worker
//!
//! Implements the `JobQueue` port with a named, deduplicating queue and a
//! worker with explicit lifecycle management: join handles are tracked,
//! cancellation is explicit, and every job execution is wrapped in a
//! timeout. Jobs are fire-and-forget; a failed job is logged and left to
//! the periodic sweep, never retried inline.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use taxbridge_core::ports::{JobQueue, JobSpec};
use taxbridge_domain::Result;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::PerformanceMetrics;

/// Executes one dequeued job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, spec: &JobSpec) -> Result<()>;
}

/// Queue state shared between producers and the worker.
#[derive(Default)]
struct QueueInner {
    queue: Mutex<VecDeque<JobSpec>>,
    /// Names of jobs queued or delayed, for duplicate suppression.
    pending_names: Mutex<HashSet<String>>,
    notify: Notify,
}

/// In-process implementation of the `JobQueue` port.
#[derive(Clone, Default)]
pub struct InProcessJobQueue {
    inner: Arc<QueueInner>,
}

impl InProcessJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the next job, or `None` when the queue is empty.
    pub async fn pop(&self) -> Option<JobSpec> {
        let mut queue = self.inner.queue.lock().await;
        let spec = queue.pop_front()?;
        self.inner.pending_names.lock().await.remove(&spec.job_name);
        Some(spec)
    }

    /// Wait until at least one job is available or the token cancels.
    pub async fn wait_for_work(&self, cancel: &CancellationToken) -> bool {
        loop {
            if !self.inner.queue.lock().await.is_empty() {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = self.inner.notify.notified() => {}
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.queue.lock().await.is_empty()
    }

    async fn push(&self, spec: JobSpec) {
        let mut queue = self.inner.queue.lock().await;
        if spec.at_front {
            queue.push_front(spec);
        } else {
            queue.push_back(spec);
        }
        drop(queue);
        self.inner.notify.notify_one();
    }
}

#[async_trait]
impl JobQueue for InProcessJobQueue {
    #[instrument(skip(self, spec), fields(job = %spec.job_name))]
    async fn enqueue(&self, spec: JobSpec) -> Result<()> {
        {
            let mut pending = self.inner.pending_names.lock().await;
            if !pending.insert(spec.job_name.clone()) {
                debug!(job = %spec.job_name, "duplicate job suppressed");
                return Ok(());
            }
        }

        match spec.delay {
            Some(delay) if !delay.is_zero() => {
                let queue = self.clone();
                debug!(job = %spec.job_name, delay_secs = delay.as_secs(), "job scheduled after delay");
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    queue.push(spec).await;
                });
            }
            _ => self.push(spec).await,
        }

        Ok(())
    }
}

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Default timeout for a single job execution.
    pub job_timeout: Duration,
    /// Join timeout when stopping.
    pub join_timeout: Duration,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self { job_timeout: Duration::from_secs(300), join_timeout: Duration::from_secs(5) }
    }
}

/// Background job worker with explicit lifecycle management.
pub struct JobWorker {
    queue: InProcessJobQueue,
    executor: Arc<dyn JobExecutor>,
    config: JobWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    metrics: Arc<PerformanceMetrics>,
}

impl JobWorker {
    pub fn new(
        queue: InProcessJobQueue,
        executor: Arc<dyn JobExecutor>,
        config: JobWorkerConfig,
        metrics: Arc<PerformanceMetrics>,
    ) -> Self {
        Self {
            queue,
            executor,
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
            metrics,
        }
    }

    /// Start the worker, spawning the background processing task.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(taxbridge_domain::TaxBridgeError::InvalidInput(
                "job worker already running".into(),
            ));
        }

        info!("starting job worker");
        self.cancellation = CancellationToken::new();

        let queue = self.queue.clone();
        let executor = Arc::clone(&self.executor);
        let cancel = self.cancellation.clone();
        let job_timeout = self.config.job_timeout;
        let metrics = Arc::clone(&self.metrics);

        let handle = tokio::spawn(async move {
            Self::process_loop(queue, executor, cancel, job_timeout, metrics).await;
        });

        self.task_handle = Some(handle);
        info!("job worker started");
        Ok(())
    }

    /// Stop the worker and wait for the processing task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Err(taxbridge_domain::TaxBridgeError::InvalidInput(
                "job worker not running".into(),
            ));
        }

        info!("stopping job worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(error = %err, "job worker task panicked");
                    return Err(taxbridge_domain::TaxBridgeError::Internal(
                        "job worker task panicked".into(),
                    ));
                }
                Err(_) => {
                    warn!("job worker did not stop within timeout");
                    return Err(taxbridge_domain::TaxBridgeError::Internal(
                        "job worker stop timed out".into(),
                    ));
                }
            }
        }

        self.cancellation = CancellationToken::new();
        info!("job worker stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn process_loop(
        queue: InProcessJobQueue,
        executor: Arc<dyn JobExecutor>,
        cancel: CancellationToken,
        default_timeout: Duration,
        metrics: Arc<PerformanceMetrics>,
    ) {
        loop {
            if !queue.wait_for_work(&cancel).await {
                debug!("job worker loop cancelled");
                break;
            }

            let Some(spec) = queue.pop().await else { continue };
            let timeout = spec.timeout.unwrap_or(default_timeout);
            let started = Instant::now();
            metrics.record_call();

            match tokio::time::timeout(timeout, executor.execute(&spec)).await {
                Ok(Ok(())) => {
                    metrics.record_duration(started.elapsed());
                    debug!(job = %spec.job_name, "job completed");
                }
                Ok(Err(err)) => {
                    metrics.record_error();
                    metrics.record_duration(started.elapsed());
                    error!(job = %spec.job_name, error = %err, "job failed");
                }
                Err(_) => {
                    metrics.record_timeout();
                    warn!(job = %spec.job_name, timeout_secs = timeout.as_secs(), "job timed out");
                }
            }
        }
    }
}

impl Drop for JobWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("JobWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use taxbridge_core::ports::JobKind;
    use tokio::sync::Mutex as TokioMutex;

    use super::*;

    struct CountingExecutor {
        executed: Arc<TokioMutex<Vec<String>>>,
        failures: AtomicUsize,
    }

    impl CountingExecutor {
        fn new() -> Self {
            Self { executed: Arc::new(TokioMutex::new(Vec::new())), failures: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl JobExecutor for CountingExecutor {
        async fn execute(&self, spec: &JobSpec) -> Result<()> {
            if spec.job_name.contains("boom") {
                self.failures.fetch_add(1, Ordering::SeqCst);
                return Err(taxbridge_domain::TaxBridgeError::Internal("boom".into()));
            }
            self.executed.lock().await.push(spec.job_name.clone());
            Ok(())
        }
    }

    fn spec(name: &str) -> JobSpec {
        JobSpec::new(JobKind::SubmitInvoice { invoice: name.to_string() }, "settings-a")
    }

    #[tokio::test]
    async fn duplicate_job_names_are_suppressed() {
        let queue = InProcessJobQueue::new();
        queue.enqueue(spec("SINV-1")).await.unwrap();
        queue.enqueue(spec("SINV-1")).await.unwrap();
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn same_name_can_requeue_after_pop() {
        let queue = InProcessJobQueue::new();
        queue.enqueue(spec("SINV-1")).await.unwrap();
        queue.pop().await.unwrap();
        queue.enqueue(spec("SINV-1")).await.unwrap();
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn at_front_jobs_jump_the_queue() {
        let queue = InProcessJobQueue::new();
        queue.enqueue(spec("SINV-1")).await.unwrap();
        queue.enqueue(spec("SINV-2").at_front()).await.unwrap();

        let first = queue.pop().await.unwrap();
        assert_eq!(first.job_name, "submit_invoice_SINV-2");
    }

    #[tokio::test]
    async fn delayed_jobs_arrive_after_the_delay() {
        let queue = InProcessJobQueue::new();
        queue
            .enqueue(spec("SINV-1").with_delay(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(queue.is_empty().await);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_drains_queue_and_stops_cleanly() {
        let queue = InProcessJobQueue::new();
        let executor = Arc::new(CountingExecutor::new());
        let metrics = Arc::new(PerformanceMetrics::new());

        let mut worker = JobWorker::new(
            queue.clone(),
            executor.clone(),
            JobWorkerConfig::default(),
            metrics.clone(),
        );
        worker.start().unwrap();

        queue.enqueue(spec("SINV-1")).await.unwrap();
        queue.enqueue(spec("SINV-2")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.stop().await.unwrap();

        let executed = executor.executed.lock().await.clone();
        assert_eq!(executed.len(), 2);
        assert!(!worker.is_running());
        assert_eq!(metrics.snapshot().calls, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failing_jobs_are_logged_not_fatal() {
        let queue = InProcessJobQueue::new();
        let executor = Arc::new(CountingExecutor::new());
        let metrics = Arc::new(PerformanceMetrics::new());

        let mut worker = JobWorker::new(
            queue.clone(),
            executor.clone(),
            JobWorkerConfig::default(),
            metrics.clone(),
        );
        worker.start().unwrap();

        queue.enqueue(spec("boom")).await.unwrap();
        queue.enqueue(spec("SINV-2")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        worker.stop().await.unwrap();

        assert_eq!(executor.failures.load(Ordering::SeqCst), 1);
        let executed = executor.executed.lock().await.clone();
        assert_eq!(executed, vec!["submit_invoice_SINV-2".to_string()]);
        assert_eq!(metrics.snapshot().errors, 1);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let queue = InProcessJobQueue::new();
        let executor = Arc::new(CountingExecutor::new());
        let metrics = Arc::new(PerformanceMetrics::new());

        let mut worker =
            JobWorker::new(queue, executor, JobWorkerConfig::default(), metrics);
        worker.start().unwrap();
        assert!(worker.start().is_err());
        worker.stop().await.unwrap();
    }
}
