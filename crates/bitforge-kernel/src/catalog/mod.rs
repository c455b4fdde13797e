//! Operation and metric catalogs.
//!
//! Catalogs are pure-function collaborators: operations map bits×params to
//! bits, metrics map bits to a number. The contract is outcome-shaped — a
//! catalog never panics and never returns `Err` across the seam; failures
//! travel inside the outcome so callers can recover locally.
//!
//! # Architecture
//!
//! ```text
//! SandboxBridge
//!     ↓ execute_operation / calculate_metric
//! ┌──────────────────────────────────────────────┐
//! │  dyn OperationCatalog  │  dyn MetricCatalog  │
//! │  (external collaborator or BuiltinCatalog)   │
//! └──────────────────────────────────────────────┘
//! ```

mod builtin;

pub use builtin::BuiltinCatalog;

use std::collections::BTreeMap;

use bitforge_types::BitBuffer;
use serde_json::Value as JsonValue;

/// Result of one operation invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// False when the operation could not run; `bits` then echoes the input.
    pub success: bool,
    /// Output bits on success, unmodified input on failure.
    pub bits: BitBuffer,
    /// Params as the operation actually resolved them, defaults included.
    pub resolved_params: JsonValue,
    /// Error text when `success` is false.
    pub error: Option<String>,
}

impl OperationOutcome {
    /// A successful outcome.
    pub fn ok(bits: BitBuffer, resolved_params: JsonValue) -> Self {
        Self { success: true, bits, resolved_params, error: None }
    }

    /// A failed outcome echoing the unmodified input.
    pub fn failed(input: BitBuffer, error: impl Into<String>) -> Self {
        Self {
            success: false,
            bits: input,
            resolved_params: JsonValue::Null,
            error: Some(error.into()),
        }
    }
}

/// Result of one metric calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOutcome {
    pub success: bool,
    pub value: f64,
    pub error: Option<String>,
}

impl MetricOutcome {
    pub fn ok(value: f64) -> Self {
        Self { success: true, value, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, value: 0.0, error: Some(error.into()) }
    }
}

/// Result of calculating every registered metric at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllMetricsOutcome {
    /// Successfully calculated metrics by id.
    pub metrics: BTreeMap<String, f64>,
    /// Error text for metrics that failed, by id.
    pub errors: BTreeMap<String, String>,
}

/// Catalog of bit operations.
///
/// Implementations must be deterministic: identical operation id, input
/// bits, and explicit params always produce identical output bits. The
/// transformation replay guarantee depends on it.
pub trait OperationCatalog: Send + Sync {
    /// Execute an operation against a full buffer.
    fn execute_operation(&self, id: &str, bits: &BitBuffer, params: Option<&JsonValue>) -> OperationOutcome;

    /// Execute an operation against `[start, end)` of `bits`, splicing the
    /// result back. The default implementation slices, delegates, and
    /// splices; a failed slice or a length-changing operation fails the
    /// outcome with the input unmodified.
    fn execute_operation_on_range(
        &self,
        id: &str,
        bits: &BitBuffer,
        start: usize,
        end: usize,
        params: Option<&JsonValue>,
    ) -> OperationOutcome {
        let segment = match bits.slice(start, end) {
            Some(segment) => segment,
            None => {
                return OperationOutcome::failed(
                    bits.clone(),
                    format!("range [{start}, {end}) out of bounds for {} bits", bits.len()),
                )
            }
        };
        let outcome = self.execute_operation(id, &segment, params);
        if !outcome.success {
            return OperationOutcome { bits: bits.clone(), ..outcome };
        }
        if outcome.bits.len() != segment.len() {
            return OperationOutcome::failed(
                bits.clone(),
                format!("operation '{id}' changed segment length on a range call"),
            );
        }
        let mut full = bits.clone();
        full.splice(start, &outcome.bits);
        OperationOutcome { bits: full, ..outcome }
    }

    /// Ids of every operation this catalog provides.
    fn operation_ids(&self) -> Vec<String>;

    /// True if `id` names a known operation.
    fn has_operation(&self, id: &str) -> bool {
        self.operation_ids().iter().any(|known| known == id)
    }
}

/// Catalog of bit metrics.
pub trait MetricCatalog: Send + Sync {
    /// Calculate one metric.
    fn calculate_metric(&self, id: &str, bits: &BitBuffer) -> MetricOutcome;

    /// Ids of every metric this catalog provides.
    fn metric_ids(&self) -> Vec<String>;

    /// Calculate every registered metric, partitioning results and errors.
    fn calculate_all_metrics(&self, bits: &BitBuffer) -> AllMetricsOutcome {
        let mut all = AllMetricsOutcome::default();
        for id in self.metric_ids() {
            let outcome = self.calculate_metric(&id, bits);
            if outcome.success {
                all.metrics.insert(id, outcome.value);
            } else {
                all.errors.insert(id, outcome.error.unwrap_or_else(|| "metric failed".into()));
            }
        }
        all
    }
}
