use super::context::JobContext;
use super::handle::{
    JobRun, JobRunStatus, SchedulerCommand, SchedulerHandle, SharedJobState,
};
use super::job::{BackgroundJob, HookEvent, JobError, ShutdownBehavior};
use crate::server::metrics;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Longest the loop sleeps without checking for due jobs.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// How long shutdown waits for each running job.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
///
/// A job never runs concurrently with itself: triggers that arrive while
/// it is running are dropped.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Receiver for hook events emitted by jobs.
    hook_receiver: mpsc::Receiver<HookEvent>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,

    /// Shared context provided to jobs during execution.
    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        hook_receiver: mpsc::Receiver<HookEvent>,
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            hook_receiver,
            command_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler.
    ///
    /// Interval-driven jobs are due immediately.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        let mut state = self.shared_state.write().await;
        if job.schedule().interval().is_some() {
            state.next_runs.insert(job_id.clone(), Utc::now());
        }
        state.jobs.insert(job_id, job);
    }

    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop. Returns once the shutdown token is cancelled.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        self.trigger_jobs_for_hook(HookEvent::OnStartup).await;

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(event) = self.hook_receiver.recv() => {
                    debug!("Received hook event: {}", event);
                    self.trigger_jobs_for_hook(event).await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }
        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Time until the earliest interval-driven job is due.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = Utc::now();
        let state = self.shared_state.read().await;
        state
            .next_runs
            .iter()
            .filter(|(job_id, _)| !state.running_jobs.contains(*job_id))
            .map(|(_, next_run)| (*next_run - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .map_or(IDLE_CHECK_INTERVAL, |d| d.min(IDLE_CHECK_INTERVAL))
    }

    /// Run all jobs that are due for scheduled execution.
    async fn run_due_jobs(&mut self) {
        let now = Utc::now();
        let jobs_to_run: Vec<String> = {
            let state = self.shared_state.read().await;
            state
                .next_runs
                .iter()
                .filter(|(job_id, next_run)| {
                    **next_run <= now && !state.running_jobs.contains(*job_id)
                })
                .map(|(job_id, _)| job_id.clone())
                .collect()
        };

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Trigger all jobs that listen for a specific hook event.
    async fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let mut jobs_to_trigger = Vec::new();

        {
            let state = self.shared_state.read().await;
            for (job_id, job) in &state.jobs {
                if !job.schedule().listens_to(event) {
                    continue;
                }
                if state.running_jobs.contains(job_id) {
                    debug!("Skipping hook trigger for already running job: {}", job_id);
                    continue;
                }
                jobs_to_trigger.push(job_id.clone());
            }
        }

        let trigger = format!("hook:{}", event);
        for job_id in jobs_to_trigger {
            self.spawn_job(&job_id, &trigger).await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = {
            let mut state = self.shared_state.write().await;
            let job = match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            };
            if !state.running_jobs.insert(job_id.to_string()) {
                return;
            }
            // Push the next scheduled run out now so the loop does not spin
            // while this run is in flight.
            if let Some(interval) = job.schedule().interval() {
                state
                    .next_runs
                    .insert(job_id.to_string(), next_run_after(Utc::now(), interval));
            }
            state.record_run(JobRun {
                job_id: job_id.to_string(),
                started_at: Utc::now(),
                finished_at: None,
                status: JobRunStatus::Running,
                error_message: None,
                triggered_by: triggered_by.to_string(),
                summary: None,
            });
            job
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);
        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_cancellation_token(cancel_token);

        let job_id_owned = job_id.to_string();
        let shared_state = Arc::clone(&self.shared_state);

        // Jobs are synchronous, run them on the blocking pool
        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg, summary) = match result {
                Ok(Ok(summary)) => {
                    info!(
                        "Job {} completed successfully in {:?}: {}",
                        job_id_owned, elapsed, summary
                    );
                    (JobRunStatus::Completed, None, Some(summary))
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (JobRunStatus::Cancelled, Some("Cancelled".to_string()), None)
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()), None)
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(format!("Task panic: {}", e)), None)
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status.as_str(), elapsed);
            metrics::set_background_job_running(&job_id_owned, false);

            let mut state = shared_state.write().await;
            state.finish_run(&job_id_owned, |run| {
                run.finished_at = Some(Utc::now());
                run.status = status;
                run.error_message = error_msg;
                run.summary = summary;
            });
            state.running_jobs.remove(&job_id_owned);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Reap finished job tasks and reschedule interval-driven jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);

            let mut state = self.shared_state.write().await;
            let interval = state.jobs.get(&job_id).and_then(|j| j.schedule().interval());
            if let Some(interval) = interval {
                state
                    .next_runs
                    .insert(job_id, next_run_after(Utc::now(), interval));
            }
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        let mut wait_jobs = Vec::new();
        {
            let state = self.shared_state.read().await;
            for (job_id, handle) in self.running_handles.drain() {
                let behavior = state
                    .jobs
                    .get(&job_id)
                    .map(|j| j.shutdown_behavior())
                    .unwrap_or_default();
                if behavior == ShutdownBehavior::Cancellable {
                    if let Some(token) = self.job_cancel_tokens.get(&job_id) {
                        debug!("Cancelling job: {}", job_id);
                        token.cancel();
                    }
                } else {
                    info!("Waiting for job {} to complete...", job_id);
                }
                wait_jobs.push(handle);
            }
        }

        for handle in wait_jobs {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

fn next_run_after(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::weeks(52))
}

/// Create a scheduler and its handle.
pub fn create_scheduler(
    hook_receiver: mpsc::Receiver<HookEvent>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(
        hook_receiver,
        command_rx,
        shutdown_token,
        job_context,
        Arc::clone(&shared_state),
    );
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::JobSchedule;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::provider::FixtureProvider;
    use serde_json::{json, Value as JsonValue};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct TestJob {
        id: &'static str,
        schedule: JobSchedule,
        execution_count: Arc<AtomicUsize>,
        should_fail: bool,
        /// Keep running until cancelled.
        block_until_cancelled: bool,
        /// Sleep this long, then report whether the run saw cancellation.
        work_for: Option<Duration>,
        shutdown_behavior: ShutdownBehavior,
        emit_on_finish: Option<HookEvent>,
    }

    impl TestJob {
        fn new(id: &'static str, schedule: JobSchedule) -> (Self, Arc<AtomicUsize>) {
            let count = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    id,
                    schedule,
                    execution_count: count.clone(),
                    should_fail: false,
                    block_until_cancelled: false,
                    work_for: None,
                    shutdown_behavior: ShutdownBehavior::Cancellable,
                    emit_on_finish: None,
                },
                count,
            )
        }
    }

    impl BackgroundJob for TestJob {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            "Test Job"
        }

        fn description(&self) -> &'static str {
            "A test job for unit tests"
        }

        fn schedule(&self) -> JobSchedule {
            self.schedule.clone()
        }

        fn shutdown_behavior(&self) -> ShutdownBehavior {
            self.shutdown_behavior
        }

        fn execute(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
            let n = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(duration) = self.work_for {
                std::thread::sleep(duration);
                return Ok(json!({ "runs": n, "cancelled": ctx.is_cancelled() }));
            }
            if self.block_until_cancelled {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                return Err(JobError::Cancelled);
            }
            if self.should_fail {
                return Err(JobError::ExecutionFailed("Test failure".to_string()));
            }
            if let Some(event) = self.emit_on_finish {
                ctx.emit(event);
            }
            Ok(json!({ "runs": n }))
        }
    }

    struct Harness {
        scheduler: JobScheduler,
        handle: SchedulerHandle,
        hook_sender: mpsc::Sender<HookEvent>,
        shutdown_token: CancellationToken,
        _temp_dir: TempDir,
    }

    fn create_test_scheduler() -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCatalogStore::new(temp_dir.path().join("catalog.db")).unwrap());
        let (hook_sender, hook_receiver) = mpsc::channel(100);
        let shutdown_token = CancellationToken::new();

        let job_context = JobContext::new(
            CancellationToken::new(),
            store.clone(),
            store,
            Arc::new(FixtureProvider::new()),
        )
        .with_hook_sender(hook_sender.clone());

        let (scheduler, handle) =
            create_scheduler(hook_receiver, shutdown_token.clone(), job_context);

        Harness {
            scheduler,
            handle,
            hook_sender,
            shutdown_token,
            _temp_dir: temp_dir,
        }
    }

    async fn wait_for_history(handle: &SchedulerHandle, job_id: &str, runs: usize) -> Vec<JobRun> {
        for _ in 0..200 {
            let history = handle.get_job_history(job_id, 10).await;
            if history.len() >= runs && history.iter().all(|r| r.status != JobRunStatus::Running) {
                return history;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.get_job_history(job_id, 10).await
    }

    #[tokio::test]
    async fn test_register_job() {
        let mut h = create_test_scheduler();
        let (job, _) = TestJob::new("a", JobSchedule::Interval(Duration::from_secs(3600)));
        h.scheduler.register_job(Arc::new(job)).await;

        assert_eq!(h.scheduler.job_count().await, 1);
        let jobs = h.handle.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].schedule.schedule_type, "interval");
        assert!(jobs[0].next_run_at.is_some());
        assert!(!jobs[0].is_running);
    }

    #[tokio::test]
    async fn test_job_execution_on_startup_hook() {
        let mut h = create_test_scheduler();
        let (job, count) = TestJob::new("startup_job", JobSchedule::Hook(HookEvent::OnStartup));
        h.scheduler.register_job(Arc::new(job)).await;

        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        let history = wait_for_history(&h.handle, "startup_job", 1).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(history[0].status, JobRunStatus::Completed);
        assert_eq!(history[0].triggered_by, "hook:OnStartup");
        assert_eq!(history[0].summary, Some(json!({ "runs": 1 })));

        h.shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_interval_job_runs_when_due() {
        let mut h = create_test_scheduler();
        let (job, count) =
            TestJob::new("interval_job", JobSchedule::Interval(Duration::from_secs(3600)));
        h.scheduler.register_job(Arc::new(job)).await;

        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        let history = wait_for_history(&h.handle, "interval_job", 1).await;
        assert_eq!(history[0].triggered_by, "schedule");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "next run is an hour away");

        h.shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_failed_job_records_error() {
        let mut h = create_test_scheduler();
        let (mut job, _) = TestJob::new("failing_job", JobSchedule::Hook(HookEvent::OnStartup));
        job.should_fail = true;
        h.scheduler.register_job(Arc::new(job)).await;

        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        let history = wait_for_history(&h.handle, "failing_job", 1).await;
        assert_eq!(history[0].status, JobRunStatus::Failed);
        assert!(history[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("Test failure"));

        h.shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
    }

    #[tokio::test]
    async fn test_emitted_hook_triggers_listening_job() {
        let mut h = create_test_scheduler();
        let (mut producer, _) = TestJob::new("producer", JobSchedule::Hook(HookEvent::OnStartup));
        producer.emit_on_finish = Some(HookEvent::OnCatalogChange);
        let (consumer, consumer_count) = TestJob::new(
            "consumer",
            JobSchedule::Combined {
                interval: None,
                hooks: vec![HookEvent::OnCatalogChange],
            },
        );
        h.scheduler.register_job(Arc::new(producer)).await;
        h.scheduler.register_job(Arc::new(consumer)).await;

        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        let history = wait_for_history(&h.handle, "consumer", 1).await;
        assert_eq!(consumer_count.load(Ordering::SeqCst), 1);
        assert_eq!(history[0].triggered_by, "hook:OnCatalogChange");

        h.shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), sched_handle).await;
        drop(h.hook_sender);
    }

    #[tokio::test]
    async fn test_manual_trigger_and_no_concurrent_runs() {
        let mut h = create_test_scheduler();
        let (mut job, count) = TestJob::new("slow", JobSchedule::Hook(HookEvent::OnCatalogChange));
        job.block_until_cancelled = true;
        h.scheduler.register_job(Arc::new(job)).await;

        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        h.handle.trigger_job("slow").await.unwrap();
        assert!(h.handle.is_job_running("slow").await);
        while count.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            h.handle.trigger_job("slow").await,
            Err(JobError::AlreadyRunning)
        ));
        h.hook_sender.send(HookEvent::OnCatalogChange).await.unwrap();
        assert!(matches!(
            h.handle.trigger_job("missing").await,
            Err(JobError::NotFound)
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        h.shutdown_token.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), sched_handle).await;

        let history = h.handle.get_job_history("slow", 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobRunStatus::Cancelled);
        assert_eq!(history[0].triggered_by, "manual");
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_uncancellable_job() {
        let mut h = create_test_scheduler();
        let (mut job, count) = TestJob::new("tx", JobSchedule::Hook(HookEvent::OnCatalogChange));
        job.work_for = Some(Duration::from_millis(200));
        job.shutdown_behavior = ShutdownBehavior::WaitForCompletion;
        h.scheduler.register_job(Arc::new(job)).await;

        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move { scheduler.run().await });

        h.handle.trigger_job("tx").await.unwrap();
        while count.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.shutdown_token.cancel();
        tokio::time::timeout(Duration::from_secs(5), sched_handle)
            .await
            .unwrap()
            .unwrap();

        // Shutdown returned only after the run finished, uncancelled.
        let history = h.handle.get_job_history("tx", 10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, JobRunStatus::Completed);
        assert_eq!(
            history[0].summary,
            Some(json!({ "runs": 1, "cancelled": false }))
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let h = create_test_scheduler();
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let mut scheduler = h.scheduler;
        let sched_handle = tokio::spawn(async move {
            scheduler.run().await;
            flag.store(true, Ordering::SeqCst);
        });

        h.shutdown_token.cancel();
        tokio::time::timeout(Duration::from_secs(2), sched_handle)
            .await
            .unwrap()
            .unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }
}
