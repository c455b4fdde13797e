//! The strategy execution engine.
//!
//! Runs one strategy's stages against one source buffer exactly once.
//! `execute_strategy` never fails with an `Err`: missing resources and
//! stage failures all come back as a structured result with `success =
//! false` and captured error text. One engine instance runs one execution
//! at a time; concurrent calls are rejected immediately — parallelism
//! lives in the job manager, across jobs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bitforge_types::{
    BitBuffer, BufferId, BufferKind, BudgetReport, ExecutionPipelineResult, FileScore, ResultId,
    StageKind, StepResult,
};
use chrono::{DateTime, Utc};

use crate::catalog::{MetricCatalog, OperationCatalog};
use crate::sandbox::InterpreterSelection;
use crate::store::{FileStore, ResultsStore, ScriptStore, StrategyStore};

use super::cost::{CostTable, DEFAULT_BUDGET};
use super::stage::StageRunner;

/// Executes strategies. One live execution per instance.
pub struct ExecutionEngine {
    strategies: Arc<StrategyStore>,
    scripts: Arc<ScriptStore>,
    files: Arc<dyn FileStore>,
    results: Arc<dyn ResultsStore>,
    metrics: Arc<dyn MetricCatalog>,
    runner: StageRunner,
    degraded: bool,
    running: AtomicBool,
}

impl ExecutionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategies: Arc<StrategyStore>,
        scripts: Arc<ScriptStore>,
        files: Arc<dyn FileStore>,
        results: Arc<dyn ResultsStore>,
        ops: Arc<dyn OperationCatalog>,
        metrics: Arc<dyn MetricCatalog>,
        interpreter: InterpreterSelection,
        costs: CostTable,
    ) -> Self {
        Self {
            strategies,
            scripts,
            files,
            results,
            metrics: metrics.clone(),
            runner: StageRunner::new(interpreter.interpreter, ops, metrics, costs),
            degraded: interpreter.degraded,
            running: AtomicBool::new(false),
        }
    }

    /// Run one strategy against one source buffer.
    pub async fn execute_strategy(
        &self,
        strategy_id: &str,
        source_id: BufferId,
    ) -> ExecutionPipelineResult {
        self.execute_strategy_with_record(strategy_id, source_id).await.0
    }

    /// Like [`execute_strategy`](Self::execute_strategy), additionally
    /// returning the id of the persisted result record on success.
    #[tracing::instrument(level = "debug", skip(self), fields(strategy = strategy_id, source = %source_id))]
    pub async fn execute_strategy_with_record(
        &self,
        strategy_id: &str,
        source_id: BufferId,
    ) -> (ExecutionPipelineResult, Option<ResultId>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return (
                self.quick_failure(strategy_id, source_id, "an execution is already running"),
                None,
            );
        }
        let result = self.run(strategy_id, source_id).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run(
        &self,
        strategy_id: &str,
        source_id: BufferId,
    ) -> (ExecutionPipelineResult, Option<ResultId>) {
        let strategy = match self.strategies.get(strategy_id).await {
            Ok(strategy) => strategy,
            Err(e) => return (self.quick_failure(strategy_id, source_id, e.to_string()), None),
        };
        let source = match self.files.get_file(source_id).await {
            Ok(source) => source,
            Err(e) => return (self.quick_failure(strategy_id, source_id, e.to_string()), None),
        };

        let mut run = RunState {
            strategy_id: strategy_id.to_string(),
            source_id,
            started_at: Utc::now(),
            timer: Instant::now(),
            steps: Vec::new(),
            initial_bits: source.bits.clone(),
            initial_metrics: self.metrics.calculate_all_metrics(&source.bits).metrics,
            bits: source.bits,
            budget: DEFAULT_BUDGET,
        };

        // Scheduler: always first, advisory output, fatal failure.
        let scheduler_source = match self.scripts.get(&strategy.scheduler_file).await {
            Ok(source) => source,
            Err(e) => {
                let error = format!("scheduler file missing: {e}");
                return (self.finish(run, false, Some(error), None), None);
            }
        };
        let outcome = self
            .runner
            .run_stage(
                StageKind::Scheduler,
                &strategy.scheduler_file,
                &scheduler_source,
                run.bits.clone(),
                run.budget,
            )
            .await;
        run.budget = outcome.budget;
        let scheduler_failed = !outcome.step.success;
        let scheduler_error = outcome.step.error.clone();
        run.steps.push(outcome.step);
        if scheduler_failed {
            let error = format!(
                "scheduler stage failed: {}",
                scheduler_error.unwrap_or_else(|| "unknown error".into())
            );
            return (self.finish(run, false, Some(error), None), None);
        }

        // Algorithms: mutate the shared buffer in list order.
        for file in &strategy.algorithm_files {
            match self.scripts.get(file).await {
                Ok(source) => {
                    let outcome = self
                        .runner
                        .run_stage(StageKind::Algorithm, file, &source, run.bits, run.budget)
                        .await;
                    run.bits = outcome.bits;
                    run.budget = outcome.budget;
                    run.steps.push(outcome.step);
                }
                Err(e) => {
                    tracing::warn!(%file, "algorithm file missing, skipping");
                    run.steps.push(StepResult::new(StageKind::Algorithm, file).fail(e.to_string()));
                }
            }
        }

        // Scoring and policy: read-only, buffer mutations discarded.
        for (kind, file_list) in [
            (StageKind::Scoring, &strategy.scoring_files),
            (StageKind::Policy, &strategy.policy_files),
        ] {
            for file in file_list {
                match self.scripts.get(file).await {
                    Ok(source) => {
                        let outcome = self
                            .runner
                            .run_stage(kind, file, &source, run.bits.clone(), run.budget)
                            .await;
                        run.budget = outcome.budget;
                        run.steps.push(outcome.step);
                    }
                    Err(e) => {
                        tracing::warn!(%file, stage = %kind, "stage file missing, skipping");
                        run.steps.push(StepResult::new(kind, file).fail(e.to_string()));
                    }
                }
            }
        }

        // Persist the derived result buffer, then the full record.
        let handle = self
            .files
            .create_file(
                &format!("{} result", strategy.name),
                run.bits.clone(),
                BufferKind::Generated,
            )
            .await;
        let result = self.finish(run, true, None, Some(handle.id));
        let record = self.results.create_result(result.clone()).await;
        (result, Some(record.id))
    }

    /// Assemble the final result from accumulated run state.
    fn finish(
        &self,
        run: RunState,
        success: bool,
        error: Option<String>,
        result_buffer_id: Option<BufferId>,
    ) -> ExecutionPipelineResult {
        let final_metrics = self.metrics.calculate_all_metrics(&run.bits).metrics;
        let metric_deltas: BTreeMap<String, f64> = final_metrics
            .iter()
            .filter_map(|(key, value)| {
                run.initial_metrics.get(key).map(|initial| (key.clone(), value - initial))
            })
            .collect();

        let scores: Vec<FileScore> = run
            .steps
            .iter()
            .filter(|s| s.stage == StageKind::Scoring)
            .filter_map(|s| s.score.map(|score| FileScore { file: s.file.clone(), score }))
            .collect();
        let total_score = scores.iter().map(|s| s.score).sum();

        let transformations: Vec<_> = run
            .steps
            .iter()
            .filter(|s| s.stage == StageKind::Algorithm)
            .flat_map(|s| s.transformations.iter().cloned())
            .collect();

        let mut operation_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut touched_ranges = Vec::new();
        for t in &transformations {
            *operation_counts.entry(t.operation.clone()).or_insert(0) += 1;
            if let Some(range) = t.target.affected_range(t.after_full.len()) {
                if !touched_ranges.contains(&range) {
                    touched_ranges.push(range);
                }
            }
        }

        ExecutionPipelineResult {
            strategy_id: run.strategy_id,
            source_id: run.source_id,
            success,
            error,
            degraded_interpreter: self.degraded,
            steps: run.steps,
            final_bits: run.bits,
            initial_bits: run.initial_bits,
            initial_metrics: run.initial_metrics,
            final_metrics,
            metric_deltas,
            scores,
            total_score,
            budget: BudgetReport {
                initial: DEFAULT_BUDGET,
                used: DEFAULT_BUDGET - run.budget,
                remaining: run.budget,
                costs: self.runner.costs().entries().clone(),
            },
            operation_counts,
            touched_ranges,
            transformations,
            result_buffer_id,
            started_at: run.started_at,
            duration_ms: run.timer.elapsed().as_secs_f64() * 1000.0,
        }
    }

    /// A failure result for runs that never got past resource lookup.
    fn quick_failure(
        &self,
        strategy_id: &str,
        source_id: BufferId,
        error: impl Into<String>,
    ) -> ExecutionPipelineResult {
        let run = RunState {
            strategy_id: strategy_id.to_string(),
            source_id,
            started_at: Utc::now(),
            timer: Instant::now(),
            steps: Vec::new(),
            initial_bits: BitBuffer::new(),
            initial_metrics: BTreeMap::new(),
            bits: BitBuffer::new(),
            budget: DEFAULT_BUDGET,
        };
        self.finish(run, false, Some(error.into()), None)
    }
}

/// State accumulated while a run walks its stages.
struct RunState {
    strategy_id: String,
    source_id: BufferId,
    started_at: DateTime<Utc>,
    timer: Instant,
    steps: Vec<StepResult>,
    initial_bits: BitBuffer,
    initial_metrics: BTreeMap<String, f64>,
    bits: BitBuffer,
    budget: f64,
}
