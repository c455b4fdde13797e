//! The sandbox bridge — the bounded API scripts execute against.
//!
//! The bridge owns the shared bits buffer, the budget counter, the log, and
//! the transformation ledger of one stage run. Scripts never touch host
//! state directly: the interpreter side only ever exchanges serializable
//! [`BridgeRequest`]/[`BridgeResponse`] values through [`SandboxBridge::dispatch`],
//! so process- or sandbox-level isolation can enforce the boundary.
//!
//! A bridge lives for exactly one stage run. The runner builds a fresh one
//! per script and tears it down afterwards, so no state leaks between
//! executions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use bitforge_types::{BitBuffer, TransformTarget, Transformation, RAW_WRITE_OPERATION};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::catalog::{MetricCatalog, OperationCatalog};
use crate::pipeline::CostTable;

/// A request from the sandboxed script side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    /// Apply an operation. Full-buffer semantics when `bits` is omitted or
    /// equals the whole shared buffer; otherwise a scratch computation
    /// whose result is returned but not spliced back.
    ApplyOperation {
        name: String,
        #[serde(default)]
        bits: Option<BitBuffer>,
        #[serde(default)]
        params: Option<JsonValue>,
    },
    /// Apply an operation to exactly `[start, end)`, splicing the result
    /// back into the shared buffer.
    ApplyOperationRange {
        name: String,
        start: usize,
        end: usize,
        #[serde(default)]
        params: Option<JsonValue>,
    },
    GetMetric { name: String },
    GetAllMetrics,
    GetCost { name: String },
    DeductBudget { amount: f64 },
    GetBit { index: usize },
    SetBit { index: usize, value: bool },
    GetBits,
    SetBits { start: usize, bits: BitBuffer },
    Log { message: String },
}

/// A response to the sandboxed script side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeResponse {
    /// Result bits of an apply call (the touched segment for range calls)
    /// or the full buffer for `GetBits`.
    Bits { bits: BitBuffer },
    Bit { value: bool },
    Number { value: f64 },
    Metrics {
        metrics: BTreeMap<String, f64>,
        errors: BTreeMap<String, String>,
    },
    /// Outcome of `DeductBudget`: `accepted` is false (and the budget
    /// unchanged) when the amount exceeded the remaining budget.
    Budget { accepted: bool, remaining: f64 },
    Ack,
    Error { message: String },
}

/// Final state extracted from a bridge after its stage run.
#[derive(Debug, Clone)]
pub struct BridgeState {
    pub bits: BitBuffer,
    pub budget: f64,
    pub log: Vec<String>,
    pub ledger: Vec<Transformation>,
}

/// The host side of the script sandbox for one stage run.
pub struct SandboxBridge {
    bits: BitBuffer,
    budget: f64,
    /// True for algorithm stages: applied operations are charged against
    /// the budget from the static cost table.
    charge_operations: bool,
    ops: Arc<dyn OperationCatalog>,
    metrics: Arc<dyn MetricCatalog>,
    costs: CostTable,
    log: Vec<String>,
    ledger: Vec<Transformation>,
}

impl SandboxBridge {
    /// Build a fresh bridge for one stage run.
    pub fn new(
        bits: BitBuffer,
        budget: f64,
        ops: Arc<dyn OperationCatalog>,
        metrics: Arc<dyn MetricCatalog>,
        costs: CostTable,
        charge_operations: bool,
    ) -> Self {
        Self {
            bits,
            budget,
            charge_operations,
            ops,
            metrics,
            costs,
            log: Vec::new(),
            ledger: Vec::new(),
        }
    }

    /// Current remaining budget.
    pub fn budget(&self) -> f64 {
        self.budget
    }

    /// Current shared buffer.
    pub fn bits(&self) -> &BitBuffer {
        &self.bits
    }

    /// Append a line to the log stream. Interpreters fold captured
    /// stdout/stderr in through this.
    pub fn push_log(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    /// Tear the bridge down, extracting its final state.
    pub fn finish(self) -> BridgeState {
        BridgeState { bits: self.bits, budget: self.budget, log: self.log, ledger: self.ledger }
    }

    /// Handle one request from the script side.
    pub fn dispatch(&mut self, request: BridgeRequest) -> BridgeResponse {
        match request {
            BridgeRequest::ApplyOperation { name, bits, params } => {
                self.apply_operation(&name, bits, params.as_ref())
            }
            BridgeRequest::ApplyOperationRange { name, start, end, params } => {
                self.apply_operation_range(&name, start, end, params.as_ref())
            }
            BridgeRequest::GetMetric { name } => {
                let outcome = self.metrics.calculate_metric(&name, &self.bits);
                if outcome.success {
                    BridgeResponse::Number { value: outcome.value }
                } else {
                    BridgeResponse::Error {
                        message: outcome.error.unwrap_or_else(|| "metric failed".into()),
                    }
                }
            }
            BridgeRequest::GetAllMetrics => {
                let all = self.metrics.calculate_all_metrics(&self.bits);
                BridgeResponse::Metrics { metrics: all.metrics, errors: all.errors }
            }
            BridgeRequest::GetCost { name } => {
                BridgeResponse::Number { value: self.costs.cost_of(&name) }
            }
            BridgeRequest::DeductBudget { amount } => {
                let accepted = amount >= 0.0 && amount <= self.budget;
                if accepted {
                    self.budget -= amount;
                }
                BridgeResponse::Budget { accepted, remaining: self.budget }
            }
            BridgeRequest::GetBit { index } => match self.bits.get(index) {
                Some(value) => BridgeResponse::Bit { value },
                None => BridgeResponse::Error {
                    message: format!("bit index {index} out of range for {} bits", self.bits.len()),
                },
            },
            BridgeRequest::SetBit { index, value } => {
                let segment: BitBuffer = vec![value].into();
                self.raw_write(index, segment)
            }
            BridgeRequest::GetBits => BridgeResponse::Bits { bits: self.bits.clone() },
            BridgeRequest::SetBits { start, bits } => self.raw_write(start, bits),
            BridgeRequest::Log { message } => {
                self.log.push(message);
                BridgeResponse::Ack
            }
        }
    }

    fn apply_operation(
        &mut self,
        name: &str,
        bits: Option<BitBuffer>,
        params: Option<&JsonValue>,
    ) -> BridgeResponse {
        // Explicit bits equal to the whole shared buffer keep full-buffer
        // semantics; anything else is a scratch computation.
        let scratch_input = bits.filter(|b| *b != self.bits);
        match scratch_input {
            None => {
                let before_full = self.bits.clone();
                let started = Instant::now();
                let outcome = self.ops.execute_operation(name, &self.bits, params);
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                if !outcome.success {
                    self.log_operation_failure(name, outcome.error.as_deref());
                    return BridgeResponse::Bits { bits: self.bits.clone() };
                }
                self.bits = outcome.bits.clone();
                self.record(
                    name,
                    outcome.resolved_params,
                    TransformTarget::Full,
                    before_full.clone(),
                    before_full,
                    outcome.bits.clone(),
                    duration_ms,
                );
                BridgeResponse::Bits { bits: outcome.bits }
            }
            Some(input) => {
                let started = Instant::now();
                let outcome = self.ops.execute_operation(name, &input, params);
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                if !outcome.success {
                    self.log_operation_failure(name, outcome.error.as_deref());
                    return BridgeResponse::Bits { bits: input };
                }
                self.record(
                    name,
                    outcome.resolved_params,
                    TransformTarget::Scratch,
                    self.bits.clone(),
                    input,
                    outcome.bits.clone(),
                    duration_ms,
                );
                BridgeResponse::Bits { bits: outcome.bits }
            }
        }
    }

    fn apply_operation_range(
        &mut self,
        name: &str,
        start: usize,
        end: usize,
        params: Option<&JsonValue>,
    ) -> BridgeResponse {
        let before_full = self.bits.clone();
        let before_segment = match self.bits.slice(start, end) {
            Some(segment) => segment,
            None => {
                self.log_operation_failure(
                    name,
                    Some(&format!("range [{start}, {end}) out of bounds")),
                );
                return BridgeResponse::Bits { bits: self.bits.clone() };
            }
        };
        let started = Instant::now();
        let outcome = self.ops.execute_operation_on_range(name, &self.bits, start, end, params);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        if !outcome.success {
            self.log_operation_failure(name, outcome.error.as_deref());
            return BridgeResponse::Bits { bits: self.bits.clone() };
        }
        self.bits = outcome.bits;
        let after_segment = self
            .bits
            .slice(start, end)
            .unwrap_or_default();
        self.record(
            name,
            outcome.resolved_params,
            TransformTarget::Range { start, end },
            before_full,
            before_segment,
            after_segment.clone(),
            duration_ms,
        );
        BridgeResponse::Bits { bits: after_segment }
    }

    /// Splice `segment` at `start`, recording the write as a synthetic
    /// transformation so the replay invariant covers raw writes too.
    fn raw_write(&mut self, start: usize, segment: BitBuffer) -> BridgeResponse {
        let end = start + segment.len();
        let before_full = self.bits.clone();
        let before_segment = match self.bits.slice(start, end) {
            Some(existing) => existing,
            None => {
                let message = format!(
                    "write of {} bits at {start} out of range for {} bits",
                    segment.len(),
                    self.bits.len()
                );
                self.log.push(message.clone());
                return BridgeResponse::Error { message };
            }
        };
        self.bits.splice(start, &segment);
        self.record(
            RAW_WRITE_OPERATION,
            serde_json::json!({ "start": start, "bits": segment.to_string() }),
            TransformTarget::Range { start, end },
            before_full,
            before_segment,
            segment,
            0.0,
        );
        BridgeResponse::Ack
    }

    fn log_operation_failure(&mut self, name: &str, error: Option<&str>) {
        let message = format!("operation '{name}' failed: {}", error.unwrap_or("unknown error"));
        tracing::warn!(operation = name, "{message}");
        self.log.push(message);
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        operation: &str,
        resolved_params: JsonValue,
        target: TransformTarget,
        before_full: BitBuffer,
        before_segment: BitBuffer,
        after_segment: BitBuffer,
        duration_ms: f64,
    ) {
        let cost = self.costs.cost_of(operation);
        if self.charge_operations {
            self.budget -= cost;
        }
        let metrics = self.metrics.calculate_all_metrics(&self.bits).metrics;
        self.ledger.push(Transformation {
            operation: operation.to_string(),
            resolved_params,
            target,
            before_full,
            after_full: self.bits.clone(),
            bits_changed: before_segment.diff_count(&after_segment),
            before_segment,
            after_segment,
            cost,
            duration_ms,
            metrics,
        });
    }
}

impl SandboxBridge {
    /// Borrow the recorded ledger.
    pub fn ledger(&self) -> &[Transformation] {
        &self.ledger
    }

    /// Borrow the log lines.
    pub fn log(&self) -> &[String] {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BuiltinCatalog;

    fn bridge(bits: &str, charge: bool) -> SandboxBridge {
        SandboxBridge::new(
            bits.parse().unwrap(),
            100.0,
            Arc::new(BuiltinCatalog),
            Arc::new(BuiltinCatalog),
            CostTable::default(),
            charge,
        )
    }

    #[test]
    fn full_buffer_apply_mutates_and_records() {
        let mut bridge = bridge("11110000", true);
        let response = bridge.dispatch(BridgeRequest::ApplyOperation {
            name: "not".into(),
            bits: None,
            params: None,
        });
        assert_eq!(
            response,
            BridgeResponse::Bits { bits: "00001111".parse().unwrap() }
        );
        assert_eq!(bridge.bits().to_string(), "00001111");

        let ledger = bridge.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].operation, "not");
        assert_eq!(ledger[0].target, TransformTarget::Full);
        assert_eq!(ledger[0].bits_changed, 8);
        assert_eq!(ledger[0].after_full.to_string(), "00001111");
    }

    #[test]
    fn explicit_full_span_bits_keep_full_semantics() {
        let mut bridge = bridge("1100", false);
        bridge.dispatch(BridgeRequest::ApplyOperation {
            name: "not".into(),
            bits: Some("1100".parse().unwrap()),
            params: None,
        });
        assert_eq!(bridge.bits().to_string(), "0011");
        assert_eq!(bridge.ledger()[0].target, TransformTarget::Full);
    }

    #[test]
    fn scratch_apply_returns_result_without_splicing() {
        let mut bridge = bridge("11110000", true);
        let response = bridge.dispatch(BridgeRequest::ApplyOperation {
            name: "not".into(),
            bits: Some("101".parse().unwrap()),
            params: None,
        });
        assert_eq!(response, BridgeResponse::Bits { bits: "010".parse().unwrap() });
        // Shared buffer untouched, scratch call still in the ledger.
        assert_eq!(bridge.bits().to_string(), "11110000");
        assert_eq!(bridge.ledger()[0].target, TransformTarget::Scratch);
    }

    #[test]
    fn range_apply_splices_back_and_returns_segment() {
        let mut bridge = bridge("11110000", true);
        let response = bridge.dispatch(BridgeRequest::ApplyOperationRange {
            name: "not".into(),
            start: 2,
            end: 6,
            params: None,
        });
        assert_eq!(response, BridgeResponse::Bits { bits: "0011".parse().unwrap() });
        assert_eq!(bridge.bits().to_string(), "11001100");
        assert_eq!(bridge.ledger()[0].target, TransformTarget::Range { start: 2, end: 6 });
        assert_eq!(bridge.ledger()[0].bits_changed, 4);
    }

    #[test]
    fn failed_operation_logs_and_leaves_input_unchanged() {
        let mut bridge = bridge("1010", true);
        let response = bridge.dispatch(BridgeRequest::ApplyOperation {
            name: "bogus".into(),
            bits: None,
            params: None,
        });
        assert_eq!(response, BridgeResponse::Bits { bits: "1010".parse().unwrap() });
        assert!(bridge.ledger().is_empty());
        assert!(bridge.log()[0].contains("bogus"));
        assert_eq!(bridge.budget(), 100.0);
    }

    #[test]
    fn deduct_budget_refuses_overdraft() {
        let mut bridge = bridge("1010", false);
        let response = bridge.dispatch(BridgeRequest::DeductBudget { amount: 250.0 });
        assert_eq!(response, BridgeResponse::Budget { accepted: false, remaining: 100.0 });

        let response = bridge.dispatch(BridgeRequest::DeductBudget { amount: 40.0 });
        assert_eq!(response, BridgeResponse::Budget { accepted: true, remaining: 60.0 });
    }

    #[test]
    fn charged_stage_pays_table_cost_per_applied_operation() {
        let mut bridge = bridge("11110000", true);
        bridge.dispatch(BridgeRequest::ApplyOperation { name: "not".into(), bits: None, params: None });
        bridge.dispatch(BridgeRequest::ApplyOperationRange {
            name: "reverse".into(),
            start: 0,
            end: 4,
            params: None,
        });
        // not = 1.0, reverse = 2.0
        assert_eq!(bridge.budget(), 97.0);
    }

    #[test]
    fn uncharged_stage_keeps_budget() {
        let mut bridge = bridge("11110000", false);
        bridge.dispatch(BridgeRequest::ApplyOperation { name: "not".into(), bits: None, params: None });
        assert_eq!(bridge.budget(), 100.0);
    }

    #[test]
    fn raw_writes_are_recorded_for_replay() {
        let mut bridge = bridge("0000", false);
        let response = bridge.dispatch(BridgeRequest::SetBits {
            start: 1,
            bits: "11".parse().unwrap(),
        });
        assert_eq!(response, BridgeResponse::Ack);
        assert_eq!(bridge.bits().to_string(), "0110");

        let ledger = bridge.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].operation, RAW_WRITE_OPERATION);
        assert_eq!(ledger[0].target, TransformTarget::Range { start: 1, end: 3 });
    }

    #[test]
    fn set_bit_out_of_range_is_an_error() {
        let mut bridge = bridge("00", false);
        let response = bridge.dispatch(BridgeRequest::SetBit { index: 9, value: true });
        assert!(matches!(response, BridgeResponse::Error { .. }));
        assert_eq!(bridge.bits().to_string(), "00");
    }

    #[test]
    fn metrics_snapshot_follows_each_mutation() {
        let mut bridge = bridge("1111", true);
        bridge.dispatch(BridgeRequest::ApplyOperation { name: "not".into(), bits: None, params: None });
        assert_eq!(bridge.ledger()[0].metrics.get("ones"), Some(&0.0));
    }

    #[test]
    fn read_api_answers_without_mutating() {
        let mut bridge = bridge("1010", false);
        assert_eq!(
            bridge.dispatch(BridgeRequest::GetBit { index: 0 }),
            BridgeResponse::Bit { value: true }
        );
        assert_eq!(
            bridge.dispatch(BridgeRequest::GetBits),
            BridgeResponse::Bits { bits: "1010".parse().unwrap() }
        );
        assert_eq!(
            bridge.dispatch(BridgeRequest::GetMetric { name: "ones".into() }),
            BridgeResponse::Number { value: 2.0 }
        );
        assert!(matches!(
            bridge.dispatch(BridgeRequest::GetMetric { name: "nope".into() }),
            BridgeResponse::Error { .. }
        ));
        match bridge.dispatch(BridgeRequest::GetAllMetrics) {
            BridgeResponse::Metrics { metrics, errors } => {
                assert_eq!(metrics.get("zeros"), Some(&2.0));
                assert!(errors.is_empty());
            }
            other => panic!("expected metrics, got {other:?}"),
        }
        assert_eq!(
            bridge.dispatch(BridgeRequest::GetCost { name: "reverse".into() }),
            BridgeResponse::Number { value: 2.0 }
        );
        assert!(bridge.ledger().is_empty());
    }

    #[test]
    fn requests_round_trip_through_serde() {
        let request = BridgeRequest::ApplyOperationRange {
            name: "not".into(),
            start: 1,
            end: 3,
            params: Some(serde_json::json!({ "amount": 2 })),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: BridgeRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }
}
