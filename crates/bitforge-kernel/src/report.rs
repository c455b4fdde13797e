//! Report export for pipeline results.
//!
//! Renders one `ExecutionPipelineResult` as plain text or CSV with a
//! stable section and column layout: Summary, Budget, Operation Costs,
//! Execution Steps, All Transformations, Bit Ranges Processed, Metrics
//! Comparison, Scoring Summary, Generated Result File.

use std::fmt::Write as _;

use bitforge_types::{ExecutionPipelineResult, StepResult, Transformation};

/// Render a pipeline result as a plain-text report.
pub fn render_text(result: &ExecutionPipelineResult) -> String {
    let mut out = String::new();

    section(&mut out, "Summary");
    let _ = writeln!(out, "Strategy:        {}", result.strategy_id);
    let _ = writeln!(out, "Source buffer:   {}", result.source_id);
    let _ = writeln!(out, "Success:         {}", result.success);
    if let Some(error) = &result.error {
        let _ = writeln!(out, "Error:           {error}");
    }
    let _ = writeln!(out, "Degraded mode:   {}", result.degraded_interpreter);
    let _ = writeln!(out, "Started:         {}", result.started_at.to_rfc3339());
    let _ = writeln!(out, "Duration (ms):   {:.1}", result.duration_ms);
    let _ = writeln!(out, "Initial bits:    {}", result.initial_bits);
    let _ = writeln!(out, "Final bits:      {}", result.final_bits);

    section(&mut out, "Budget");
    let _ = writeln!(out, "Initial:   {:.1}", result.budget.initial);
    let _ = writeln!(out, "Used:      {:.1}", result.budget.used);
    let _ = writeln!(out, "Remaining: {:.1}", result.budget.remaining);

    section(&mut out, "Operation Costs");
    for (operation, cost) in &result.budget.costs {
        let _ = writeln!(out, "{operation}: {cost:.1}");
    }

    section(&mut out, "Execution Steps");
    for (index, step) in result.steps.iter().enumerate() {
        let status = if step.success { "ok" } else { "failed" };
        let _ = write!(
            out,
            "{index}. [{}] {} — {status}, {:.1}ms, {} transformation(s)",
            step.stage,
            step.file,
            step.duration_ms,
            step.transformations.len()
        );
        if let Some(error) = &step.error {
            let _ = write!(out, " ({error})");
        }
        out.push('\n');
    }

    section(&mut out, "All Transformations");
    for (index, stage, transformation) in numbered_transformations(&result.steps) {
        let range = transformation
            .target
            .affected_range(transformation.after_full.len())
            .map(|r| r.to_string())
            .unwrap_or_else(|| "scratch".to_string());
        let _ = writeln!(
            out,
            "{index}. [{stage}] {} params={} range={range} changed={} duration={:.1}ms",
            transformation.operation,
            transformation.resolved_params,
            transformation.bits_changed,
            transformation.duration_ms
        );
    }

    section(&mut out, "Bit Ranges Processed");
    for range in &result.touched_ranges {
        let _ = writeln!(out, "{range}");
    }

    section(&mut out, "Metrics Comparison");
    for (metric, final_value) in &result.final_metrics {
        let initial = result.initial_metrics.get(metric).copied().unwrap_or(0.0);
        let delta = result.metric_deltas.get(metric).copied().unwrap_or(0.0);
        let _ = writeln!(out, "{metric}: {initial:.3} -> {final_value:.3} (Δ {delta:+.3})");
    }

    section(&mut out, "Scoring Summary");
    for score in &result.scores {
        let _ = writeln!(out, "{}: {:.3}", score.file, score.score);
    }
    let _ = writeln!(out, "Total: {:.3}", result.total_score);

    section(&mut out, "Generated Result File");
    match result.result_buffer_id {
        Some(id) => {
            let _ = writeln!(out, "Buffer id: {id}");
        }
        None => {
            let _ = writeln!(out, "none");
        }
    }

    out
}

/// Render a pipeline result as CSV, one section per block.
pub fn render_csv(result: &ExecutionPipelineResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Section,Field,Value");
    for (field, value) in [
        ("strategy", result.strategy_id.clone()),
        ("source", result.source_id.to_string()),
        ("success", result.success.to_string()),
        ("error", result.error.clone().unwrap_or_default()),
        ("degraded", result.degraded_interpreter.to_string()),
        ("duration_ms", format!("{:.1}", result.duration_ms)),
        ("initial_bits", result.initial_bits.to_string()),
        ("final_bits", result.final_bits.to_string()),
        ("budget_initial", format!("{:.1}", result.budget.initial)),
        ("budget_used", format!("{:.1}", result.budget.used)),
        ("budget_remaining", format!("{:.1}", result.budget.remaining)),
    ] {
        let _ = writeln!(out, "Summary,{field},{}", csv_field(&value));
    }
    out.push('\n');

    let _ = writeln!(out, "Operation,Cost");
    for (operation, cost) in &result.budget.costs {
        let _ = writeln!(out, "{},{cost:.1}", csv_field(operation));
    }
    out.push('\n');

    let _ = writeln!(out, "Step,Stage,File,Success,DurationMs,Transformations,Score,Passed,Error");
    for (index, step) in result.steps.iter().enumerate() {
        let _ = writeln!(
            out,
            "{index},{},{},{},{:.1},{},{},{},{}",
            step.stage,
            csv_field(&step.file),
            step.success,
            step.duration_ms,
            step.transformations.len(),
            step.score.map(|s| s.to_string()).unwrap_or_default(),
            step.passed.map(|p| p.to_string()).unwrap_or_default(),
            csv_field(step.error.as_deref().unwrap_or("")),
        );
    }
    out.push('\n');

    let _ = writeln!(out, "Index,Stage,Operation,Params,Range,BitsChanged,DurationMs");
    for (index, stage, transformation) in numbered_transformations(&result.steps) {
        let range = transformation
            .target
            .affected_range(transformation.after_full.len())
            .map(|r| format!("{}..{}", r.start, r.end))
            .unwrap_or_else(|| "scratch".to_string());
        let _ = writeln!(
            out,
            "{index},{stage},{},{},{range},{},{:.1}",
            csv_field(&transformation.operation),
            csv_field(&transformation.resolved_params.to_string()),
            transformation.bits_changed,
            transformation.duration_ms,
        );
    }
    out.push('\n');

    let _ = writeln!(out, "Metric,Initial,Final,Delta");
    for (metric, final_value) in &result.final_metrics {
        let initial = result.initial_metrics.get(metric).copied().unwrap_or(0.0);
        let delta = result.metric_deltas.get(metric).copied().unwrap_or(0.0);
        let _ = writeln!(out, "{},{initial},{final_value},{delta}", csv_field(metric));
    }
    out.push('\n');

    let _ = writeln!(out, "ScoringFile,Score");
    for score in &result.scores {
        let _ = writeln!(out, "{},{}", csv_field(&score.file), score.score);
    }
    let _ = writeln!(out, "total,{}", result.total_score);
    out.push('\n');

    let _ = writeln!(out, "GeneratedResultFile");
    let _ = writeln!(
        out,
        "{}",
        result
            .result_buffer_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    out
}

fn section(out: &mut String, title: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    let _ = writeln!(out, "=== {title} ===");
}

/// Transformations across all steps with a global index and their stage.
fn numbered_transformations(
    steps: &[StepResult],
) -> impl Iterator<Item = (usize, String, &Transformation)> {
    steps
        .iter()
        .flat_map(|step| {
            step.transformations
                .iter()
                .map(move |t| (step.stage.to_string(), t))
        })
        .enumerate()
        .map(|(index, (stage, t))| (index, stage, t))
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bitforge_types::{BitBuffer, BufferKind, StrategyConfig};

    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::pipeline::{CostTable, ExecutionEngine};
    use crate::sandbox::select_interpreter;
    use crate::store::{
        FileStore, MemoryFileStore, MemoryResultsStore, ResultsStore, ScriptStore, StrategyStore,
    };

    async fn sample_result() -> ExecutionPipelineResult {
        let strategies = Arc::new(StrategyStore::new());
        let scripts = Arc::new(ScriptStore::new());
        let files: Arc<dyn FileStore> = Arc::new(MemoryFileStore::new());
        let results: Arc<dyn ResultsStore> = Arc::new(MemoryResultsStore::new());

        scripts.put("sched.bf", "log(\"plan\")").await;
        scripts.put("invert.bf", "apply_operation(\"not\")").await;
        scripts.put("score.bf", "print(\"score: 7\")").await;
        strategies
            .register(
                StrategyConfig::new("invert", "Invert", "sched.bf")
                    .with_algorithm("invert.bf")
                    .with_scoring("score.bf"),
            )
            .await;
        let source = files
            .create_file("src", "11110000".parse::<BitBuffer>().unwrap(), BufferKind::Source)
            .await;

        let engine = ExecutionEngine::new(
            strategies,
            scripts,
            files,
            results,
            Arc::new(BuiltinCatalog),
            Arc::new(BuiltinCatalog),
            select_interpreter(None),
            CostTable::default(),
        );
        engine.execute_strategy("invert", source.id).await
    }

    #[tokio::test]
    async fn text_report_has_all_sections_in_order() {
        let report = render_text(&sample_result().await);
        let sections = [
            "=== Summary ===",
            "=== Budget ===",
            "=== Operation Costs ===",
            "=== Execution Steps ===",
            "=== All Transformations ===",
            "=== Bit Ranges Processed ===",
            "=== Metrics Comparison ===",
            "=== Scoring Summary ===",
            "=== Generated Result File ===",
        ];
        let mut last = 0;
        for title in sections {
            let position = report.find(title).unwrap_or_else(|| panic!("missing section {title}"));
            assert!(position >= last, "section {title} out of order");
            last = position;
        }
        assert!(report.contains("Final bits:      00001111"));
        assert!(report.contains("Total: 7.000"));
    }

    #[tokio::test]
    async fn csv_report_has_stable_columns() {
        let report = render_csv(&sample_result().await);
        assert!(report.contains("Section,Field,Value"));
        assert!(report.contains("Step,Stage,File,Success,DurationMs,Transformations,Score,Passed,Error"));
        assert!(report.contains("Index,Stage,Operation,Params,Range,BitsChanged,DurationMs"));
        assert!(report.contains("Metric,Initial,Final,Delta"));
        // The not() transformation shows up with its full-buffer range.
        assert!(report.contains("0,algorithm,not,{},0..8,8"));
    }

    #[test]
    fn csv_fields_are_escaped() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
