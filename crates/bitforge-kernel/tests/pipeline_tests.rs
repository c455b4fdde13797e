//! Integration tests for the strategy execution pipeline.
//!
//! These drive the engine through whole strategies and verify the fixed
//! stage order, the structured-failure contract, budget accounting, and
//! the deterministic replay guarantee.

use std::sync::Arc;
use std::time::Duration;

use bitforge_kernel::catalog::BuiltinCatalog;
use bitforge_kernel::pipeline::{replay_transformations, DEFAULT_BUDGET};
use bitforge_kernel::store::{FileStore, ResultsStore};
use bitforge_kernel::{Workbench, WorkbenchConfig};
use bitforge_testutil::{bits, seed_invert_fixture, SlowInterpreter, BROKEN_SCRIPT};
use bitforge_types::{BufferId, BufferKind, StageKind, StrategyConfig, TransformTarget};

async fn invert_bench() -> (Workbench, BufferId) {
    let bench = Workbench::new(WorkbenchConfig::default());
    let source = seed_invert_fixture(&bench).await;
    (bench, source.id)
}

// ============================================================================
// Successful runs
// ============================================================================

#[tokio::test]
async fn full_pipeline_runs_stages_in_fixed_order() {
    let (bench, source) = invert_bench().await;
    let result = bench.engine().execute_strategy("invert", source).await;

    assert!(result.success, "pipeline should succeed: {:?}", result.error);
    let kinds: Vec<StageKind> = result.steps.iter().map(|s| s.stage).collect();
    assert_eq!(
        kinds,
        vec![StageKind::Scheduler, StageKind::Algorithm, StageKind::Scoring, StageKind::Policy]
    );
    assert_eq!(result.initial_bits, bits("11110000"));
    assert_eq!(result.final_bits, bits("00001111"));
    assert_eq!(result.total_score, 7.0);
    assert_eq!(result.steps[3].passed, Some(true));
}

#[tokio::test]
async fn successful_run_persists_result_record_and_buffer() {
    let (bench, source) = invert_bench().await;
    let result = bench.engine().execute_strategy("invert", source).await;

    // Generated result buffer holds the final bits.
    let buffer_id = result.result_buffer_id.expect("result buffer");
    let record = bench.files().get_file(buffer_id).await.unwrap();
    assert_eq!(record.bits, bits("00001111"));
    assert_eq!(record.handle.kind, BufferKind::Generated);

    // The persisted record carries the full ledger.
    let records = bench.results().list_results().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].result.transformations.len(), 1);
    assert_eq!(records[0].result.transformations[0].operation, "not");
}

#[tokio::test]
async fn budget_is_charged_only_for_algorithm_stage_operations() {
    let (bench, source) = invert_bench().await;
    let result = bench.engine().execute_strategy("invert", source).await;

    // One not() at table cost 1.0; scoring/policy/scheduler never charge.
    assert_eq!(result.budget.initial, DEFAULT_BUDGET);
    assert_eq!(result.budget.used, 1.0);
    assert_eq!(result.budget.remaining, DEFAULT_BUDGET - 1.0);

    let charged: f64 = result.transformations.iter().map(|t| t.cost).sum();
    assert_eq!(result.budget.used, charged);
}

#[tokio::test]
async fn replaying_the_ledger_reproduces_final_bits() {
    let bench = Workbench::new(WorkbenchConfig::default());
    bench.add_script("sched.bf", "log(\"plan\")").await;
    bench
        .add_script(
            "mix.bf",
            concat!(
                "apply_operation(\"not\")\n",
                "apply_operation_range(\"reverse\", 1, 6)\n",
                "apply_operation(\"shift_left\", {\"amount\": 2})\n",
            ),
        )
        .await;
    bench
        .register_strategy(StrategyConfig::new("mix", "Mix", "sched.bf").with_algorithm("mix.bf"))
        .await;
    let source = bench.create_source("src", bits("1100101001")).await;

    let result = bench.engine().execute_strategy("mix", source.id).await;
    assert!(result.success);
    assert_eq!(result.transformations.len(), 3);

    let replayed =
        replay_transformations(&BuiltinCatalog, &result.initial_bits, &result.transformations)
            .unwrap();
    assert_eq!(replayed, result.final_bits);
}

#[tokio::test]
async fn repeated_runs_are_deterministic() {
    let (bench, source) = invert_bench().await;
    let engine = bench.engine();
    let first = engine.execute_strategy("invert", source).await;
    let second = engine.execute_strategy("invert", source).await;
    assert_eq!(first.final_bits, second.final_bits);
    assert_eq!(first.total_score, second.total_score);
}

#[tokio::test]
async fn metric_deltas_reflect_the_mutation() {
    let (bench, source) = invert_bench().await;
    let result = bench.engine().execute_strategy("invert", source).await;
    // 11110000 has 4 ones; so does 00001111.
    assert_eq!(result.initial_metrics.get("ones"), Some(&4.0));
    assert_eq!(result.final_metrics.get("ones"), Some(&4.0));
    assert_eq!(result.metric_deltas.get("ones"), Some(&0.0));
    // The longest run shrinks from 4 to 4 as well, but transitions stay 1.
    assert_eq!(result.metric_deltas.get("transitions"), Some(&0.0));
}

#[tokio::test]
async fn operation_counts_and_touched_ranges_cover_the_ledger() {
    let (bench, source) = invert_bench().await;
    let result = bench.engine().execute_strategy("invert", source).await;
    assert_eq!(result.operation_counts.get("not"), Some(&1));
    assert_eq!(result.touched_ranges.len(), 1);
    assert_eq!(result.touched_ranges[0].start, 0);
    assert_eq!(result.touched_ranges[0].end, 8);
}

// ============================================================================
// Structured failures — the engine never returns an Err
// ============================================================================

#[tokio::test]
async fn missing_strategy_is_a_structured_failure() {
    let (bench, source) = invert_bench().await;
    let result = bench.engine().execute_strategy("ghost", source).await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or("").contains("strategy not found"));
    assert!(result.steps.is_empty());
}

#[tokio::test]
async fn missing_source_is_a_structured_failure() {
    let (bench, _) = invert_bench().await;
    let result = bench.engine().execute_strategy("invert", BufferId(9999)).await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or("").contains("buffer not found"));
}

#[tokio::test]
async fn missing_scheduler_file_is_fatal() {
    let bench = Workbench::new(WorkbenchConfig::default());
    bench
        .register_strategy(StrategyConfig::new("headless", "Headless", "missing.bf"))
        .await;
    let source = bench.create_source("src", bits("1010")).await;

    let result = bench.engine().execute_strategy("headless", source.id).await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or("").contains("scheduler file missing"));
}

#[tokio::test]
async fn failing_scheduler_aborts_the_whole_pipeline() {
    let (bench, source) = invert_bench().await;
    bench.add_script("sched.bf", BROKEN_SCRIPT).await;

    let result = bench.engine().execute_strategy("invert", source).await;
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or("").contains("scheduler stage failed"));
    // Only the scheduler step ran.
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.final_bits, result.initial_bits);
}

#[tokio::test]
async fn failing_algorithm_stage_does_not_abort_the_pipeline() {
    let (bench, source) = invert_bench().await;
    bench.add_script("invert.bf", BROKEN_SCRIPT).await;

    let result = bench.engine().execute_strategy("invert", source).await;
    assert!(result.success);
    let algorithm = result.steps.iter().find(|s| s.stage == StageKind::Algorithm).unwrap();
    assert!(!algorithm.success);
    // Scoring and policy still ran.
    assert!(result.steps.iter().any(|s| s.stage == StageKind::Scoring && s.success));
    assert!(result.steps.iter().any(|s| s.stage == StageKind::Policy && s.success));
}

#[tokio::test]
async fn missing_algorithm_file_degrades_to_a_failed_step() {
    let bench = Workbench::new(WorkbenchConfig::default());
    bench.add_script("sched.bf", "log(\"plan\")").await;
    bench
        .register_strategy(
            StrategyConfig::new("gappy", "Gappy", "sched.bf").with_algorithm("nowhere.bf"),
        )
        .await;
    let source = bench.create_source("src", bits("1010")).await;

    let result = bench.engine().execute_strategy("gappy", source.id).await;
    assert!(result.success);
    let algorithm = result.steps.iter().find(|s| s.stage == StageKind::Algorithm).unwrap();
    assert!(!algorithm.success);
    assert_eq!(result.final_bits, result.initial_bits);
}

#[tokio::test]
async fn failing_policy_is_advisory_only() {
    let (bench, source) = invert_bench().await;
    bench.add_script("policy.bf", bitforge_testutil::POLICY_FAIL_SCRIPT).await;

    let result = bench.engine().execute_strategy("invert", source).await;
    assert!(result.success);
    let policy = result.steps.iter().find(|s| s.stage == StageKind::Policy).unwrap();
    assert!(policy.success);
    assert_eq!(policy.passed, Some(false));
}

// ============================================================================
// Sandbox semantics through the whole pipeline
// ============================================================================

#[tokio::test]
async fn scoring_stage_mutations_are_discarded() {
    let (bench, source) = invert_bench().await;
    // A scoring file that tries to mutate: the mutation must not leak into
    // the final buffer and must not appear in the pipeline ledger.
    bench
        .add_script("score.bf", "apply_operation(\"set_all\")\nprint(\"score: 1\")")
        .await;

    let result = bench.engine().execute_strategy("invert", source).await;
    assert!(result.success);
    assert_eq!(result.final_bits, bits("00001111"));
    assert!(result.transformations.iter().all(|t| t.operation == "not"));
    // The scoring step still recorded its own view of the call.
    let scoring = result.steps.iter().find(|s| s.stage == StageKind::Scoring).unwrap();
    assert_eq!(scoring.transformations.len(), 1);
    assert_eq!(scoring.score, Some(1.0));
}

#[tokio::test]
async fn scratch_computations_never_touch_the_shared_buffer() {
    let bench = Workbench::new(WorkbenchConfig::default());
    bench.add_script("sched.bf", "log(\"plan\")").await;
    bench.add_script("range.bf", "apply_operation_range(\"not\", 0, 2)").await;
    bench
        .register_strategy(StrategyConfig::new("edge", "Edge", "sched.bf").with_algorithm("range.bf"))
        .await;
    let source = bench.create_source("src", bits("0000")).await;

    let result = bench.engine().execute_strategy("edge", source.id).await;
    assert!(result.success);
    assert_eq!(result.final_bits, bits("1100"));
    assert_eq!(
        result.transformations[0].target,
        TransformTarget::Range { start: 0, end: 2 }
    );
}

#[tokio::test]
async fn degraded_mode_is_flagged_on_results() {
    let (bench, source) = invert_bench().await;
    assert!(bench.degraded());
    let result = bench.engine().execute_strategy("invert", source).await;
    assert!(result.degraded_interpreter);
}

#[tokio::test]
async fn primary_interpreter_clears_the_degraded_flag() {
    let bench = Workbench::new(WorkbenchConfig {
        interpreter: Some(Arc::new(SlowInterpreter::new(Duration::from_millis(1)))),
        ..Default::default()
    });
    let source = seed_invert_fixture(&bench).await;
    assert!(!bench.degraded());
    let result = bench.engine().execute_strategy("invert", source.id).await;
    assert!(!result.degraded_interpreter);
    assert!(result.success);
}

// ============================================================================
// Engine-level mutual exclusion
// ============================================================================

#[tokio::test]
async fn concurrent_calls_on_one_engine_are_rejected() {
    let bench = Workbench::new(WorkbenchConfig {
        interpreter: Some(Arc::new(SlowInterpreter::new(Duration::from_millis(100)))),
        ..Default::default()
    });
    let source = seed_invert_fixture(&bench).await;
    let engine = Arc::new(bench.engine());

    let (first, second) = tokio::join!(
        engine.execute_strategy("invert", source.id),
        engine.execute_strategy("invert", source.id),
    );

    let failures: Vec<_> = [&first, &second]
        .into_iter()
        .filter(|r| !r.success)
        .collect();
    assert_eq!(failures.len(), 1, "exactly one call must be rejected");
    assert!(failures[0]
        .error
        .as_deref()
        .unwrap_or("")
        .contains("already running"));
    assert!(first.success || second.success);
}
