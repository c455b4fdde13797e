//! The job manager — admission control and lifecycle for jobs.
//!
//! Jobs are created pending and admitted by the queue processor in
//! priority/creation order, up to the configured max-parallel cap and only
//! once every dependency is archived as completed. Each admitted job runs
//! in its own task, iterating its presets in order; pause and cancel are
//! cooperative gates awaited at iteration boundaries through a watch
//! channel, never mid-iteration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bitforge_types::{
    BatchConfig, BatchId, BatchMode, BufferId, Job, JobExecutionResult, JobId, JobOptions,
    JobStatus, Priority, StrategyPreset,
};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{watch, Notify, RwLock};

use crate::catalog::{MetricCatalog, OperationCatalog};
use crate::pipeline::{CostTable, ExecutionEngine};
use crate::sandbox::InterpreterSelection;
use crate::store::{FileStore, ResultsStore, ScriptStore, StrategyStore};

use super::eta::estimate_eta;
use super::queue::{admission_order, dependencies_met};
use super::watchdog::{StallWatchdog, StallWatchdogConfig};

/// Scheduler operation errors.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("job validation failed: {}", errors.join("; "))]
    Validation { errors: Vec<String> },
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),
    #[error("job {id} cannot {action} from status {status}")]
    InvalidState { id: JobId, status: JobStatus, action: &'static str },
    #[error("max parallel must be between 1 and 10, got {0}")]
    MaxParallelOutOfRange(usize),
    #[error("job {0} is not a failed archived job")]
    NotRetryable(JobId),
}

/// Outcome of job requirement validation.
///
/// Validation is pure over the store state: identical inputs always
/// produce identical outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Job manager configuration.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Concurrently running job cap, 1..=10.
    pub max_parallel: usize,
    /// Stall watchdog thresholds; `None` disables the watchdog.
    pub stall: Option<StallWatchdogConfig>,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self { max_parallel: 2, stall: Some(StallWatchdogConfig::default()) }
    }
}

/// Cooperative control signal for one job task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobControl {
    Run,
    Pause,
    Cancel,
}

struct ActiveJob {
    job: Job,
    control: watch::Sender<JobControl>,
    /// True once a run task has been spawned for the current admission.
    spawned: bool,
}

struct ManagerInner {
    max_parallel: AtomicUsize,
    next_job_id: AtomicU64,
    next_batch_id: AtomicU64,
    active: RwLock<HashMap<JobId, ActiveJob>>,
    archive: RwLock<HashMap<JobId, Job>>,
    archive_notify: Notify,
    strategies: Arc<StrategyStore>,
    scripts: Arc<ScriptStore>,
    files: Arc<dyn FileStore>,
    results: Arc<dyn ResultsStore>,
    ops: Arc<dyn OperationCatalog>,
    metrics: Arc<dyn MetricCatalog>,
    interpreter: InterpreterSelection,
    costs: CostTable,
    watchdog: Option<StallWatchdog>,
}

/// Priority queue + concurrency governor over jobs.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<ManagerInner>,
}

impl JobManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategies: Arc<StrategyStore>,
        scripts: Arc<ScriptStore>,
        files: Arc<dyn FileStore>,
        results: Arc<dyn ResultsStore>,
        ops: Arc<dyn OperationCatalog>,
        metrics: Arc<dyn MetricCatalog>,
        interpreter: InterpreterSelection,
        config: JobManagerConfig,
    ) -> Self {
        let watchdog = config
            .stall
            .map(|stall| StallWatchdog::builder(stall).spawn());
        Self {
            inner: Arc::new(ManagerInner {
                max_parallel: AtomicUsize::new(config.max_parallel.clamp(1, 10)),
                next_job_id: AtomicU64::new(1),
                next_batch_id: AtomicU64::new(1),
                active: RwLock::new(HashMap::new()),
                archive: RwLock::new(HashMap::new()),
                archive_notify: Notify::new(),
                strategies,
                scripts,
                files,
                results,
                ops,
                metrics,
                interpreter,
                costs: CostTable::default(),
                watchdog,
            }),
        }
    }

    /// Check whether a job with these inputs could be created.
    pub async fn validate_job_requirements(
        &self,
        source_ref: BufferId,
        presets: &[StrategyPreset],
    ) -> JobValidation {
        self.inner.validate(source_ref, presets).await
    }

    /// Create a pending job. Fails without creating anything when
    /// validation finds errors.
    pub async fn create_job(
        &self,
        name: impl Into<String>,
        source_ref: BufferId,
        presets: Vec<StrategyPreset>,
        opts: JobOptions,
    ) -> Result<Job, SchedulerError> {
        let validation = self.inner.validate(source_ref, &presets).await;
        if !validation.valid {
            return Err(SchedulerError::Validation { errors: validation.errors });
        }
        Ok(self.inner.insert_job(name.into(), source_ref, presets, opts, None).await)
    }

    /// Create a batch of jobs sharing a batch id. Sequential batches chain
    /// each job's dependencies to the previous job; parallel batches leave
    /// them independent. Nothing is created when any member fails
    /// validation.
    pub async fn create_batch(&self, config: BatchConfig) -> Result<Vec<Job>, SchedulerError> {
        let mut errors = Vec::new();
        for spec in &config.jobs {
            let validation = self.inner.validate(spec.source_ref, &spec.presets).await;
            for error in validation.errors {
                errors.push(format!("{}: {error}", spec.name));
            }
        }
        if !errors.is_empty() {
            return Err(SchedulerError::Validation { errors });
        }

        let batch_id = BatchId(self.inner.next_batch_id.fetch_add(1, Ordering::SeqCst));
        let mut created = Vec::with_capacity(config.jobs.len());
        let mut previous: Option<JobId> = None;
        for spec in config.jobs {
            let mut opts = spec.opts;
            if config.mode == BatchMode::Sequential {
                if let Some(prev) = previous {
                    opts.depends_on.push(prev);
                }
            }
            let job = self
                .inner
                .insert_job(spec.name, spec.source_ref, spec.presets, opts, Some(batch_id))
                .await;
            previous = Some(job.id);
            created.push(job);
        }
        tracing::debug!(batch = %batch_id, jobs = created.len(), "batch created");
        Ok(created)
    }

    /// Request execution of a pending job. The job starts now if capacity
    /// and dependencies allow, and stays queued otherwise.
    pub async fn start_job(&self, id: JobId) -> Result<(), SchedulerError> {
        {
            let active = self.inner.active.read().await;
            let entry = active.get(&id).ok_or(SchedulerError::JobNotFound(id))?;
            if entry.job.status != JobStatus::Pending {
                return Err(SchedulerError::InvalidState {
                    id,
                    status: entry.job.status,
                    action: "start",
                });
            }
        }
        self.inner.process_queue().await;
        Ok(())
    }

    /// Request execution of every pending job in a batch.
    pub async fn start_batch(&self, batch_id: BatchId) -> Result<(), SchedulerError> {
        let known = {
            let active = self.inner.active.read().await;
            active.values().any(|entry| entry.job.batch_id == Some(batch_id))
        };
        if !known {
            return Err(SchedulerError::BatchNotFound(batch_id));
        }
        self.inner.process_queue().await;
        Ok(())
    }

    /// Suspend a running job at its next iteration boundary.
    pub async fn pause_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let mut active = self.inner.active.write().await;
        let entry = active.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        match entry.job.status {
            JobStatus::Paused => Ok(()),
            JobStatus::Running => {
                entry.job.status = JobStatus::Paused;
                entry.job.paused_at = Some(Utc::now());
                let _ = entry.control.send(JobControl::Pause);
                // A paused job is idle on purpose; don't report it stalled.
                if let Some(watchdog) = &self.inner.watchdog {
                    watchdog.unwatch(id);
                }
                tracing::debug!(job = %id, "job paused");
                Ok(())
            }
            status => Err(SchedulerError::InvalidState { id, status, action: "pause" }),
        }
    }

    /// Resume a paused job.
    pub async fn resume_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let mut active = self.inner.active.write().await;
        let entry = active.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        match entry.job.status {
            JobStatus::Running => Ok(()),
            JobStatus::Paused => {
                entry.job.status = JobStatus::Running;
                entry.job.paused_at = None;
                let _ = entry.control.send(JobControl::Run);
                if let Some(watchdog) = &self.inner.watchdog {
                    watchdog.watch(id);
                }
                tracing::debug!(job = %id, "job resumed");
                Ok(())
            }
            status => Err(SchedulerError::InvalidState { id, status, action: "resume" }),
        }
    }

    /// Cancel a job. Running jobs stop at the next iteration boundary; no
    /// further results are appended after cancellation.
    pub async fn cancel_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let mut active = self.inner.active.write().await;
        let entry = active.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        if entry.job.status.is_terminal() {
            return Err(SchedulerError::InvalidState {
                id,
                status: entry.job.status,
                action: "cancel",
            });
        }
        entry.job.status = JobStatus::Cancelled;
        entry.job.end_time = Some(Utc::now());
        let _ = entry.control.send(JobControl::Cancel);
        tracing::debug!(job = %id, "job cancelled");
        if !entry.spawned {
            // Never admitted: archive directly, there is no task to do it.
            if let Some(entry) = active.remove(&id) {
                drop(active);
                self.inner.archive_job(entry.job).await;
            }
        }
        Ok(())
    }

    /// Manually retry a failed archived job by cloning it into a fresh
    /// pending job.
    pub async fn retry_job(&self, id: JobId) -> Result<Job, SchedulerError> {
        let source = {
            let archive = self.inner.archive.read().await;
            let job = archive.get(&id).ok_or(SchedulerError::JobNotFound(id))?;
            if job.status != JobStatus::Failed {
                return Err(SchedulerError::NotRetryable(id));
            }
            job.clone()
        };
        let opts = JobOptions {
            priority: source.priority,
            tags: source.tags.clone(),
            max_retries: source.max_retries,
            depends_on: source.depends_on.clone(),
        };
        let job = self
            .inner
            .insert_job(source.name.clone(), source.source_ref, source.presets, opts, source.batch_id)
            .await;
        tracing::debug!(failed = %id, retry = %job.id, "failed job cloned for retry");
        Ok(job)
    }

    /// Change a job's priority.
    pub async fn set_priority(&self, id: JobId, priority: Priority) -> Result<(), SchedulerError> {
        let mut active = self.inner.active.write().await;
        let entry = active.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        entry.job.priority = priority;
        Ok(())
    }

    /// Bump a job to critical priority, the front of the queue.
    pub async fn prioritize(&self, id: JobId) -> Result<(), SchedulerError> {
        self.set_priority(id, Priority::Critical).await
    }

    /// Attach a tag to an active job.
    pub async fn add_tag(&self, id: JobId, tag: impl Into<String>) -> Result<(), SchedulerError> {
        let tag = tag.into();
        let mut active = self.inner.active.write().await;
        let entry = active.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        if !entry.job.tags.contains(&tag) {
            entry.job.tags.push(tag);
        }
        Ok(())
    }

    /// Remove a tag from an active job.
    pub async fn remove_tag(&self, id: JobId, tag: &str) -> Result<(), SchedulerError> {
        let mut active = self.inner.active.write().await;
        let entry = active.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        entry.job.tags.retain(|t| t != tag);
        Ok(())
    }

    /// Every job (active or archived) carrying `tag`.
    pub async fn jobs_with_tag(&self, tag: &str) -> Vec<Job> {
        let mut jobs = Vec::new();
        for entry in self.inner.active.read().await.values() {
            if entry.job.tags.iter().any(|t| t == tag) {
                jobs.push(entry.job.clone());
            }
        }
        for job in self.inner.archive.read().await.values() {
            if job.tags.iter().any(|t| t == tag) {
                jobs.push(job.clone());
            }
        }
        jobs
    }

    /// Set the concurrently running job cap (1..=10). Raising it may admit
    /// queued jobs immediately.
    pub async fn set_max_parallel(&self, max_parallel: usize) -> Result<(), SchedulerError> {
        if !(1..=10).contains(&max_parallel) {
            return Err(SchedulerError::MaxParallelOutOfRange(max_parallel));
        }
        self.inner.max_parallel.store(max_parallel, Ordering::SeqCst);
        self.inner.process_queue().await;
        Ok(())
    }

    /// The current concurrently running job cap.
    pub fn max_parallel(&self) -> usize {
        self.inner.max_parallel.load(Ordering::SeqCst)
    }

    /// Look a job up in the active set or the archive.
    pub async fn get_job(&self, id: JobId) -> Option<Job> {
        if let Some(entry) = self.inner.active.read().await.get(&id) {
            return Some(entry.job.clone());
        }
        self.inner.archive.read().await.get(&id).cloned()
    }

    /// All non-archived jobs.
    pub async fn active_jobs(&self) -> Vec<Job> {
        self.inner.active.read().await.values().map(|e| e.job.clone()).collect()
    }

    /// All archived jobs.
    pub async fn archived_jobs(&self) -> Vec<Job> {
        self.inner.archive.read().await.values().cloned().collect()
    }

    /// Pending jobs in admission order.
    pub async fn queue_snapshot(&self) -> Vec<JobId> {
        let active = self.inner.active.read().await;
        admission_order(active.values().map(|e| &e.job))
    }

    /// Every job of a batch, active or archived.
    pub async fn batch_jobs(&self, batch_id: BatchId) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .active
            .read()
            .await
            .values()
            .filter(|e| e.job.batch_id == Some(batch_id))
            .map(|e| e.job.clone())
            .collect();
        jobs.extend(
            self.inner
                .archive
                .read()
                .await
                .values()
                .filter(|j| j.batch_id == Some(batch_id))
                .cloned(),
        );
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    /// Wait until a job reaches the archive, returning its final record.
    pub async fn wait_for_job(&self, id: JobId) -> Option<Job> {
        loop {
            // Register interest before checking, so an archival landing
            // between the check and the await still wakes us.
            let notified = self.inner.archive_notify.notified();
            {
                let archive = self.inner.archive.read().await;
                if let Some(job) = archive.get(&id) {
                    return Some(job.clone());
                }
            }
            {
                let active = self.inner.active.read().await;
                if !active.contains_key(&id) {
                    return None;
                }
            }
            notified.await;
        }
    }
}

impl ManagerInner {
    async fn validate(&self, source_ref: BufferId, presets: &[StrategyPreset]) -> JobValidation {
        let mut errors = Vec::new();

        match self.files.get_file(source_ref).await {
            Ok(record) if record.bits.is_empty() => {
                errors.push("source data is empty".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }

        if presets.is_empty() {
            errors.push("at least one strategy preset is required".to_string());
        }
        for (index, preset) in presets.iter().enumerate() {
            if preset.iterations < 1 {
                errors.push(format!("preset {index}: iterations must be at least 1"));
            }
            match self.strategies.get(&preset.strategy_id).await {
                Err(e) => errors.push(format!("preset {index}: {e}")),
                Ok(strategy) => {
                    // A strategy without its scheduler script can never run.
                    if !self.scripts.contains(&strategy.scheduler_file).await {
                        errors.push(format!(
                            "preset {index}: strategy '{}' scheduler file '{}' is missing",
                            strategy.id, strategy.scheduler_file
                        ));
                    }
                    for file in strategy.algorithm_files.iter().chain(&strategy.scoring_files) {
                        if !self.scripts.contains(file).await {
                            tracing::warn!(
                                strategy = %strategy.id,
                                %file,
                                "stage file missing; the stage will be skipped"
                            );
                        }
                    }
                }
            }
        }

        JobValidation { valid: errors.is_empty(), errors }
    }

    async fn insert_job(
        &self,
        name: String,
        source_ref: BufferId,
        presets: Vec<StrategyPreset>,
        opts: JobOptions,
        batch_id: Option<BatchId>,
    ) -> Job {
        let id = JobId(self.next_job_id.fetch_add(1, Ordering::SeqCst));
        let mut job = Job::new(id, name, source_ref, presets, opts);
        job.batch_id = batch_id;
        let (control, _) = watch::channel(JobControl::Run);
        let entry = ActiveJob { job: job.clone(), control, spawned: false };
        self.active.write().await.insert(id, entry);
        tracing::debug!(job = %id, "job created");
        job
    }

    /// Admit pending jobs up to free capacity, in admission order,
    /// skipping jobs with unmet dependencies.
    async fn process_queue(self: &Arc<Self>) {
        let mut active = self.active.write().await;
        let archive = self.archive.read().await;

        let occupied = active
            .values()
            .filter(|e| matches!(e.job.status, JobStatus::Running | JobStatus::Paused))
            .count();
        let cap = self.max_parallel.load(Ordering::SeqCst);
        let mut free = cap.saturating_sub(occupied);
        if free == 0 {
            return;
        }

        let order = admission_order(active.values().map(|e| &e.job));
        for id in order {
            if free == 0 {
                break;
            }
            let entry = match active.get_mut(&id) {
                Some(entry) => entry,
                None => continue,
            };
            if !dependencies_met(&entry.job, &archive) {
                continue;
            }

            entry.job.status = JobStatus::Running;
            entry.job.start_time = Some(Utc::now());
            entry.job.progress = 0.0;
            entry.job.current_preset_index = 0;
            entry.job.current_iteration = 0;
            entry.job.error = None;
            entry.job.eta = None;
            let (control, control_rx) = watch::channel(JobControl::Run);
            entry.control = control;
            entry.spawned = true;
            free -= 1;
            tracing::debug!(job = %id, "job admitted");

            let inner = self.clone();
            tokio::spawn(async move {
                run_job(inner, id, control_rx).await;
            });
        }
    }

    async fn with_job<R>(&self, id: JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut active = self.active.write().await;
        active.get_mut(&id).map(|entry| f(&mut entry.job))
    }

    async fn archive_job(&self, job: Job) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.unwatch(job.id);
        }
        self.archive.write().await.insert(job.id, job);
        self.archive_notify.notify_waiters();
    }

    /// Move an active job to the archive, applying `f` first.
    async fn finalize(self: &Arc<Self>, id: JobId, f: impl FnOnce(&mut Job)) {
        let entry = self.active.write().await.remove(&id);
        if let Some(mut entry) = entry {
            f(&mut entry.job);
            tracing::debug!(job = %id, status = %entry.job.status, "job archived");
            self.archive_job(entry.job).await;
        }
        // Capacity freed up (or a dependency completed): admit next.
        self.process_queue().await;
    }

    /// Job-level failure: auto-retry while the retry budget lasts,
    /// otherwise archive as failed.
    async fn fail_or_retry(self: &Arc<Self>, id: JobId, error: String) {
        let retry = self
            .with_job(id, |job| {
                if job.retry_count < job.max_retries {
                    job.retry_count += 1;
                    job.error = None;
                    job.status = JobStatus::Pending;
                    job.progress = 0.0;
                    job.start_time = None;
                    true
                } else {
                    false
                }
            })
            .await;
        match retry {
            Some(true) => {
                if let Some(watchdog) = &self.watchdog {
                    watchdog.unwatch(id);
                }
                if let Some(entry) = self.active.write().await.get_mut(&id) {
                    entry.spawned = false;
                }
                tracing::warn!(job = %id, %error, "job failed, requeued for retry");
                self.process_queue().await;
            }
            Some(false) => {
                tracing::warn!(job = %id, %error, "job failed, retries exhausted");
                self.finalize(id, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(error);
                    job.end_time = Some(Utc::now());
                })
                .await;
            }
            None => {}
        }
    }
}

enum Gate {
    Runnable,
    Cancelled,
}

/// Await the control channel until the job may run (or is cancelled).
/// This is the only suspension point between iterations.
async fn wait_until_runnable(control: &mut watch::Receiver<JobControl>) -> Gate {
    loop {
        let state = *control.borrow_and_update();
        match state {
            JobControl::Run => return Gate::Runnable,
            JobControl::Cancel => return Gate::Cancelled,
            JobControl::Pause => {
                if control.changed().await.is_err() {
                    return Gate::Cancelled;
                }
            }
        }
    }
}

/// The per-job run task: iterate presets in order, one engine invocation
/// per iteration, gating on the control channel at every boundary.
fn run_job(
    inner: Arc<ManagerInner>,
    id: JobId,
    mut control: watch::Receiver<JobControl>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
    let (presets, source_ref) = match inner
        .with_job(id, |job| (job.presets.clone(), job.source_ref))
        .await
    {
        Some(snapshot) => snapshot,
        None => return,
    };

    if let Some(watchdog) = &inner.watchdog {
        watchdog.watch(id);
    }

    // Losing the source data is a job-level failure, not an iteration
    // failure: nothing can run without it.
    if let Err(e) = inner.files.get_file(source_ref).await {
        inner.fail_or_retry(id, format!("source unavailable: {e}")).await;
        return;
    }

    let engine = ExecutionEngine::new(
        inner.strategies.clone(),
        inner.scripts.clone(),
        inner.files.clone(),
        inner.results.clone(),
        inner.ops.clone(),
        inner.metrics.clone(),
        inner.interpreter.clone(),
        inner.costs.clone(),
    );

    let total_iterations: u32 = presets.iter().map(|p| p.iterations).sum();
    let mut completed: u32 = 0;

    for (preset_index, preset) in presets.iter().enumerate() {
        for iteration in 0..preset.iterations {
            if matches!(wait_until_runnable(&mut control).await, Gate::Cancelled) {
                inner.finalize(id, |_| {}).await;
                return;
            }

            let found = inner
                .with_job(id, |job| {
                    job.current_preset_index = preset_index;
                    job.current_iteration = iteration;
                })
                .await;
            if found.is_none() {
                return;
            }

            let started = Instant::now();
            let (result, record_id) = engine
                .execute_strategy_with_record(&preset.strategy_id, source_ref)
                .await;
            let execution = JobExecutionResult {
                preset_index,
                strategy_id: preset.strategy_id.clone(),
                iteration,
                success: result.success,
                result_id: record_id,
                error: result.error,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                finished_at: Utc::now(),
            };

            // A cancel raised mid-iteration is honored before the result
            // is credited: nothing is appended after cancellation.
            if *control.borrow() == JobControl::Cancel {
                inner.finalize(id, |_| {}).await;
                return;
            }

            completed += 1;
            let progress = f64::from(completed) / f64::from(total_iterations.max(1)) * 100.0;
            let found = inner
                .with_job(id, |job| {
                    job.results.push(execution);
                    job.progress = progress;
                    job.eta = job.start_time.and_then(|start| {
                        let elapsed_ms = (Utc::now() - start).num_milliseconds() as f64;
                        estimate_eta(progress, elapsed_ms)
                    });
                })
                .await;
            if found.is_none() {
                return;
            }
            if let Some(watchdog) = &inner.watchdog {
                watchdog.report_progress(id);
            }
        }
    }

    inner
        .finalize(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100.0;
            job.end_time = Some(Utc::now());
            job.eta = None;
        })
        .await;
    })
}

#[cfg(test)]
mod tests {
    use bitforge_types::{BitBuffer, BufferKind, StrategyConfig};

    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::sandbox::select_interpreter;
    use crate::store::{MemoryFileStore, MemoryResultsStore};

    async fn manager() -> (JobManager, BufferId) {
        let strategies = Arc::new(StrategyStore::new());
        let scripts = Arc::new(ScriptStore::new());
        let files: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        let results: Arc<dyn ResultsStore> = Arc::new(MemoryResultsStore::new());

        scripts.put("sched.bf", "log(\"plan: run everything\")").await;
        scripts.put("invert.bf", "apply_operation(\"not\")").await;
        strategies
            .register(StrategyConfig::new("invert", "Invert", "sched.bf").with_algorithm("invert.bf"))
            .await;

        let source: BitBuffer = "11110000".parse().unwrap();
        let handle = files.create_file("source", source, BufferKind::Source).await;

        let manager = JobManager::new(
            strategies,
            scripts,
            files,
            results,
            Arc::new(BuiltinCatalog),
            Arc::new(BuiltinCatalog),
            select_interpreter(None),
            JobManagerConfig { max_parallel: 2, stall: None },
        );
        (manager, handle.id)
    }

    #[tokio::test]
    async fn create_job_rejects_empty_presets() {
        let (manager, source) = manager().await;
        let err = manager
            .create_job("empty", source, vec![], JobOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Validation { .. }));
        assert!(manager.active_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn create_job_rejects_zero_iterations() {
        let (manager, source) = manager().await;
        let err = manager
            .create_job("zero", source, vec![StrategyPreset::new("invert", 0)], JobOptions::default())
            .await
            .unwrap_err();
        let SchedulerError::Validation { errors } = err else { panic!("expected validation") };
        assert!(errors.iter().any(|e| e.contains("iterations")));
    }

    #[tokio::test]
    async fn create_job_rejects_unknown_strategy() {
        let (manager, source) = manager().await;
        let err = manager
            .create_job("ghost", source, vec![StrategyPreset::new("ghost", 1)], JobOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Validation { .. }));
    }

    #[tokio::test]
    async fn validation_is_idempotent() {
        let (manager, source) = manager().await;
        let presets = vec![StrategyPreset::new("missing", 0)];
        let first = manager.validate_job_requirements(source, &presets).await;
        let second = manager.validate_job_requirements(source, &presets).await;
        assert_eq!(first, second);
        assert!(!first.valid);
    }

    #[tokio::test]
    async fn set_max_parallel_bounds() {
        let (manager, _) = manager().await;
        assert!(manager.set_max_parallel(0).await.is_err());
        assert!(manager.set_max_parallel(11).await.is_err());
        assert!(manager.set_max_parallel(10).await.is_ok());
        assert_eq!(manager.max_parallel(), 10);
    }

    #[tokio::test]
    async fn tags_round_trip() {
        let (manager, source) = manager().await;
        let job = manager
            .create_job("tagged", source, vec![StrategyPreset::new("invert", 1)], JobOptions::default())
            .await
            .unwrap();
        manager.add_tag(job.id, "night").await.unwrap();
        manager.add_tag(job.id, "night").await.unwrap();
        let tagged = manager.jobs_with_tag("night").await;
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].tags, vec!["night"]);

        manager.remove_tag(job.id, "night").await.unwrap();
        assert!(manager.jobs_with_tag("night").await.is_empty());
    }

    #[tokio::test]
    async fn pause_requires_running() {
        let (manager, source) = manager().await;
        let job = manager
            .create_job("pending", source, vec![StrategyPreset::new("invert", 1)], JobOptions::default())
            .await
            .unwrap();
        let err = manager.pause_job(job.id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn cancel_pending_job_archives_immediately() {
        let (manager, source) = manager().await;
        let job = manager
            .create_job("never-ran", source, vec![StrategyPreset::new("invert", 1)], JobOptions::default())
            .await
            .unwrap();
        manager.cancel_job(job.id).await.unwrap();
        let archived = manager.get_job(job.id).await.unwrap();
        assert_eq!(archived.status, JobStatus::Cancelled);
        assert!(archived.end_time.is_some());
        assert!(archived.results.is_empty());
    }
}
