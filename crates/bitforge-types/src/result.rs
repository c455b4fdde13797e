//! Structured results of stage and pipeline execution.
//!
//! Lower layers return these result objects with success flags instead of
//! propagating errors across awaited boundaries; a failed stage or pipeline
//! is data, not an `Err`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bits::BitBuffer;
use crate::handle::{BufferId, ResultId};
use crate::strategy::StageKind;
use crate::transform::{BitRange, Transformation};

/// The result of executing one stage script file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Which stage group the file belonged to.
    pub stage: StageKind,
    /// Script file name.
    pub file: String,
    /// False when the script errored or the file was missing.
    pub success: bool,
    /// Captured log lines, including folded stdout/stderr.
    pub log: Vec<String>,
    /// Transformations recorded while this file ran.
    pub transformations: Vec<Transformation>,
    /// Score extracted from the log (scoring stages only).
    pub score: Option<f64>,
    /// Advisory verdict extracted from the log (policy stages only).
    pub passed: Option<bool>,
    /// Captured error text when `success` is false.
    pub error: Option<String>,
    /// Wall-clock stage duration, in milliseconds.
    pub duration_ms: f64,
}

impl StepResult {
    /// A skeleton result for a stage that has not produced output yet.
    pub fn new(stage: StageKind, file: impl Into<String>) -> Self {
        Self {
            stage,
            file: file.into(),
            success: true,
            log: Vec::new(),
            transformations: Vec::new(),
            score: None,
            passed: None,
            error: None,
            duration_ms: 0.0,
        }
    }

    /// Mark the step failed with captured error text.
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Score contributed by one scoring file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileScore {
    pub file: String,
    pub score: f64,
}

/// Budget accounting for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Budget at the start of the run (the fixed default).
    pub initial: f64,
    /// Total charged: explicit deductions plus per-operation costs over
    /// algorithm-stage transformations.
    pub used: f64,
    /// `initial - used`.
    pub remaining: f64,
    /// The static per-operation cost table in effect.
    pub costs: BTreeMap<String, f64>,
}

/// The immutable result of one (strategy, source) pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPipelineResult {
    /// Strategy that ran.
    pub strategy_id: String,
    /// Source buffer the run started from.
    pub source_id: BufferId,
    /// False when the pipeline failed before completing its stages.
    pub success: bool,
    /// Captured error text when `success` is false.
    pub error: Option<String>,
    /// True when the restricted fallback interpreter executed the scripts.
    pub degraded_interpreter: bool,
    /// Every stage step in execution order.
    pub steps: Vec<StepResult>,
    /// Buffer state before the first stage.
    pub initial_bits: BitBuffer,
    /// Buffer state after the last algorithm stage.
    pub final_bits: BitBuffer,
    /// Metrics of the initial buffer.
    pub initial_metrics: BTreeMap<String, f64>,
    /// Metrics of the final buffer.
    pub final_metrics: BTreeMap<String, f64>,
    /// `final - initial` per metric present in both snapshots.
    pub metric_deltas: BTreeMap<String, f64>,
    /// Per-file scores in scoring-stage order.
    pub scores: Vec<FileScore>,
    /// Sum of all per-file scores.
    pub total_score: f64,
    /// Budget accounting for the run.
    pub budget: BudgetReport,
    /// Invocation count per operation id over the applied ledger.
    pub operation_counts: BTreeMap<String, u64>,
    /// Shared-buffer ranges touched by the applied ledger.
    pub touched_ranges: Vec<BitRange>,
    /// The transformation ledger: everything algorithm stages recorded, in
    /// order. Replaying it from `initial_bits` yields exactly `final_bits`
    /// (scratch entries never touched the shared buffer and replay as
    /// no-ops).
    pub transformations: Vec<Transformation>,
    /// Generated result buffer, present on success.
    pub result_buffer_id: Option<BufferId>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total run duration, in milliseconds.
    pub duration_ms: f64,
}

/// A pipeline result as persisted by the results store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Store-assigned id.
    pub id: ResultId,
    /// When the record was persisted.
    pub created_at: DateTime<Utc>,
    /// The full pipeline result, transformation ledger included.
    pub result: ExecutionPipelineResult,
}
