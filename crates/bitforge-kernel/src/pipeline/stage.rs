//! Stage execution — one script file against one fresh bridge.

use std::sync::Arc;
use std::time::Instant;

use bitforge_types::{BitBuffer, StageKind, StepResult};

use crate::catalog::{MetricCatalog, OperationCatalog};
use crate::sandbox::{Interpreter, SandboxBridge};

use super::cost::CostTable;
use super::heuristics::{extract_score, extract_verdict};

/// Result of one stage run: the step record plus the bridge's final
/// buffer and budget for the engine to thread onward.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub step: StepResult,
    pub bits: BitBuffer,
    pub budget: f64,
}

/// Executes stage scripts, one fresh bridge per script.
pub struct StageRunner {
    interpreter: Arc<dyn Interpreter>,
    ops: Arc<dyn OperationCatalog>,
    metrics: Arc<dyn MetricCatalog>,
    costs: CostTable,
}

impl StageRunner {
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        ops: Arc<dyn OperationCatalog>,
        metrics: Arc<dyn MetricCatalog>,
        costs: CostTable,
    ) -> Self {
        Self { interpreter, ops, metrics, costs }
    }

    /// The cost table stage runs charge from.
    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    /// Run one script file.
    ///
    /// The bridge is created fresh for the run and torn down afterwards;
    /// only algorithm stages charge operations against the budget. A
    /// script error marks the step failed but keeps whatever the bridge
    /// accumulated before the failure.
    pub async fn run_stage(
        &self,
        kind: StageKind,
        file: &str,
        source: &str,
        bits: BitBuffer,
        budget: f64,
    ) -> StageOutcome {
        let charge = kind == StageKind::Algorithm;
        let mut bridge = SandboxBridge::new(
            bits,
            budget,
            self.ops.clone(),
            self.metrics.clone(),
            self.costs.clone(),
            charge,
        );

        let started = Instant::now();
        let execution = self.interpreter.execute(source, &mut bridge).await;
        let state = bridge.finish();

        let mut step = StepResult::new(kind, file);
        step.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        step.log = state.log;
        step.transformations = state.ledger;

        if let Err(e) = execution {
            tracing::warn!(stage = %kind, file, error = %e, "stage script failed");
            step = step.fail(e.to_string());
        }

        match kind {
            StageKind::Scoring => step.score = extract_score(&step.log),
            StageKind::Policy => step.passed = extract_verdict(&step.log),
            StageKind::Scheduler | StageKind::Algorithm => {}
        }

        StageOutcome { step, bits: state.bits, budget: state.budget }
    }
}
