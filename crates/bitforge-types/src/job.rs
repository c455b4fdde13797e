//! Job records — the unit of scheduling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eta::EtaEstimate;
use crate::handle::{BufferId, ResultId};

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a batch of jobs created together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state. A job is in exactly one state at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created or requeued, waiting for admission.
    Pending,
    /// Admitted and executing iterations.
    Running,
    /// Suspended at an iteration boundary.
    Paused,
    /// All iterations finished; archived.
    Completed,
    /// A job-level error exhausted retries; archived.
    Failed,
    /// Aborted by request; archived.
    Cancelled,
}

impl JobStatus {
    /// True for states that move the job into the archive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Paused => write!(f, "paused"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Admission priority. Lower rank admits first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort rank: critical < high < normal < low.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// One (strategy, iterations) entry of a job's preset list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyPreset {
    /// Strategy to execute.
    pub strategy_id: String,
    /// How many times to run it. Each iteration restarts from the job's
    /// source bits; iterations are not cumulative.
    pub iterations: u32,
}

impl StrategyPreset {
    pub fn new(strategy_id: impl Into<String>, iterations: u32) -> Self {
        Self { strategy_id: strategy_id.into(), iterations }
    }
}

/// Outcome of one (preset, iteration) engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionResult {
    /// Index into the job's preset list.
    pub preset_index: usize,
    /// Strategy that ran.
    pub strategy_id: String,
    /// Zero-based iteration number within the preset.
    pub iteration: u32,
    /// False when the pipeline reported failure.
    pub success: bool,
    /// Persisted pipeline result, when the run produced one.
    pub result_id: Option<ResultId>,
    /// Captured error text for failed iterations.
    pub error: Option<String>,
    /// Iteration duration, in milliseconds.
    pub duration_ms: f64,
    /// When the iteration finished.
    pub finished_at: DateTime<Utc>,
}

/// Optional settings supplied at job creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Admission priority. Defaults to normal.
    #[serde(default)]
    pub priority: Priority,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Automatic retry budget for job-level failures.
    #[serde(default)]
    pub max_retries: u32,
    /// Jobs that must be archived as completed before this one may run.
    #[serde(default)]
    pub depends_on: Vec<JobId>,
}

/// A named unit of work: source data plus an ordered preset list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Source buffer every iteration restarts from.
    pub source_ref: BufferId,
    /// Ordered (strategy, iterations) presets.
    pub presets: Vec<StrategyPreset>,
    pub status: JobStatus,
    pub priority: Priority,
    /// 0–100; non-decreasing while the job is running.
    pub progress: f64,
    /// Index of the preset currently executing.
    pub current_preset_index: usize,
    /// Iteration currently executing within the preset.
    pub current_iteration: u32,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    /// Results of finished iterations, in execution order.
    pub results: Vec<JobExecutionResult>,
    pub tags: Vec<String>,
    pub max_retries: u32,
    pub retry_count: u32,
    pub depends_on: Vec<JobId>,
    pub batch_id: Option<BatchId>,
    /// Latest completion estimate, recomputed on each progress tick.
    pub eta: Option<EtaEstimate>,
    /// Captured error text for failed jobs.
    pub error: Option<String>,
}

impl Job {
    /// Create a pending job with the given settings.
    pub fn new(
        id: JobId,
        name: impl Into<String>,
        source_ref: BufferId,
        presets: Vec<StrategyPreset>,
        opts: JobOptions,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            source_ref,
            presets,
            status: JobStatus::Pending,
            priority: opts.priority,
            progress: 0.0,
            current_preset_index: 0,
            current_iteration: 0,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            paused_at: None,
            results: Vec::new(),
            tags: opts.tags,
            max_retries: opts.max_retries,
            retry_count: 0,
            depends_on: opts.depends_on,
            batch_id: None,
            eta: None,
            error: None,
        }
    }

    /// Total number of iterations across all presets.
    pub fn total_iterations(&self) -> u32 {
        self.presets.iter().map(|p| p.iterations).sum()
    }
}

/// How the jobs of a batch relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Each job depends on the previous job in the batch.
    Sequential,
    /// Jobs are independent and may run concurrently.
    Parallel,
}

/// Specification of one job inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobSpec {
    pub name: String,
    pub source_ref: BufferId,
    pub presets: Vec<StrategyPreset>,
    #[serde(default)]
    pub opts: JobOptions,
}

/// Configuration for creating a batch of jobs together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub name: String,
    pub mode: BatchMode,
    pub jobs: Vec<BatchJobSpec>,
}
