//! Builtin catalog — deterministic operations and metrics.
//!
//! Ships so the subsystem is exercisable without an external catalog.
//! Every operation is a pure function of (bits, params); every metric a
//! pure function of bits.

use bitforge_types::BitBuffer;
use serde_json::{json, Value as JsonValue};

use super::{MetricCatalog, MetricOutcome, OperationCatalog, OperationOutcome};

const OPERATIONS: &[&str] = &["not", "set_all", "clear_all", "shift_left", "reverse", "fill_pattern"];
const METRICS: &[&str] = &["ones", "zeros", "ones_ratio", "transitions", "longest_run"];

/// The builtin operation and metric catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl OperationCatalog for BuiltinCatalog {
    fn execute_operation(&self, id: &str, bits: &BitBuffer, params: Option<&JsonValue>) -> OperationOutcome {
        match id {
            "not" => {
                let out: Vec<bool> = bits.as_slice().iter().map(|b| !b).collect();
                OperationOutcome::ok(out.into(), json!({}))
            }
            "set_all" => OperationOutcome::ok(vec![true; bits.len()].into(), json!({})),
            "clear_all" => OperationOutcome::ok(BitBuffer::zeros(bits.len()), json!({})),
            "shift_left" => {
                // Callers may omit the amount; it resolves to 1.
                let amount = params
                    .and_then(|p| p.get("amount"))
                    .and_then(JsonValue::as_u64)
                    .unwrap_or(1) as usize;
                let len = bits.len();
                let mut out = vec![false; len];
                if amount < len {
                    out[..len - amount].copy_from_slice(&bits.as_slice()[amount..]);
                }
                OperationOutcome::ok(out.into(), json!({ "amount": amount }))
            }
            "reverse" => {
                let mut out = bits.as_slice().to_vec();
                out.reverse();
                OperationOutcome::ok(out.into(), json!({}))
            }
            "fill_pattern" => {
                let pattern = params
                    .and_then(|p| p.get("pattern"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or("10")
                    .to_string();
                let parsed: BitBuffer = match pattern.parse() {
                    Ok(parsed) => parsed,
                    Err(e) => return OperationOutcome::failed(bits.clone(), format!("bad pattern: {e}")),
                };
                if parsed.is_empty() {
                    return OperationOutcome::failed(bits.clone(), "empty pattern");
                }
                let out: Vec<bool> = (0..bits.len())
                    .map(|i| parsed.as_slice()[i % parsed.len()])
                    .collect();
                OperationOutcome::ok(out.into(), json!({ "pattern": pattern }))
            }
            unknown => OperationOutcome::failed(bits.clone(), format!("unknown operation '{unknown}'")),
        }
    }

    fn operation_ids(&self) -> Vec<String> {
        OPERATIONS.iter().map(|s| s.to_string()).collect()
    }
}

impl MetricCatalog for BuiltinCatalog {
    fn calculate_metric(&self, id: &str, bits: &BitBuffer) -> MetricOutcome {
        let ones = bits.as_slice().iter().filter(|b| **b).count() as f64;
        match id {
            "ones" => MetricOutcome::ok(ones),
            "zeros" => MetricOutcome::ok(bits.len() as f64 - ones),
            "ones_ratio" => {
                if bits.is_empty() {
                    MetricOutcome::ok(0.0)
                } else {
                    MetricOutcome::ok(ones / bits.len() as f64)
                }
            }
            "transitions" => {
                let transitions = bits
                    .as_slice()
                    .windows(2)
                    .filter(|pair| pair[0] != pair[1])
                    .count();
                MetricOutcome::ok(transitions as f64)
            }
            "longest_run" => {
                let mut longest = 0usize;
                let mut current = 0usize;
                let mut prev: Option<bool> = None;
                for bit in bits.as_slice() {
                    if prev == Some(*bit) {
                        current += 1;
                    } else {
                        current = 1;
                        prev = Some(*bit);
                    }
                    longest = longest.max(current);
                }
                MetricOutcome::ok(longest as f64)
            }
            unknown => MetricOutcome::failed(format!("unknown metric '{unknown}'")),
        }
    }

    fn metric_ids(&self) -> Vec<String> {
        METRICS.iter().map(|s| s.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> BitBuffer {
        s.parse().unwrap()
    }

    #[test]
    fn not_inverts_every_bit() {
        let outcome = BuiltinCatalog.execute_operation("not", &bits("11110000"), None);
        assert!(outcome.success);
        assert_eq!(outcome.bits.to_string(), "00001111");
    }

    #[test]
    fn not_is_deterministic() {
        let input = bits("1100101");
        let a = BuiltinCatalog.execute_operation("not", &input, None);
        let b = BuiltinCatalog.execute_operation("not", &input, None);
        assert_eq!(a.bits, b.bits);
    }

    #[test]
    fn shift_left_resolves_default_amount() {
        let outcome = BuiltinCatalog.execute_operation("shift_left", &bits("1000"), None);
        assert!(outcome.success);
        assert_eq!(outcome.bits.to_string(), "0000");
        assert_eq!(outcome.resolved_params, serde_json::json!({ "amount": 1 }));
    }

    #[test]
    fn shift_left_honors_explicit_amount() {
        let params = serde_json::json!({ "amount": 2 });
        let outcome = BuiltinCatalog.execute_operation("shift_left", &bits("10110000"), Some(&params));
        assert_eq!(outcome.bits.to_string(), "11000000");
    }

    #[test]
    fn fill_pattern_repeats() {
        let params = serde_json::json!({ "pattern": "10" });
        let outcome = BuiltinCatalog.execute_operation("fill_pattern", &bits("00000"), Some(&params));
        assert_eq!(outcome.bits.to_string(), "10101");
    }

    #[test]
    fn unknown_operation_fails_with_input_unchanged() {
        let input = bits("1010");
        let outcome = BuiltinCatalog.execute_operation("nope", &input, None);
        assert!(!outcome.success);
        assert_eq!(outcome.bits, input);
    }

    #[test]
    fn range_execution_splices_back() {
        let outcome =
            BuiltinCatalog.execute_operation_on_range("not", &bits("11110000"), 2, 6, None);
        assert!(outcome.success);
        assert_eq!(outcome.bits.to_string(), "11001100");
    }

    #[test]
    fn range_out_of_bounds_fails() {
        let input = bits("1111");
        let outcome = BuiltinCatalog.execute_operation_on_range("not", &input, 2, 9, None);
        assert!(!outcome.success);
        assert_eq!(outcome.bits, input);
    }

    #[test]
    fn metrics_on_known_buffer() {
        let input = bits("11010001");
        let catalog = BuiltinCatalog;
        assert_eq!(catalog.calculate_metric("ones", &input).value, 4.0);
        assert_eq!(catalog.calculate_metric("zeros", &input).value, 4.0);
        assert_eq!(catalog.calculate_metric("ones_ratio", &input).value, 0.5);
        assert_eq!(catalog.calculate_metric("transitions", &input).value, 4.0);
        assert_eq!(catalog.calculate_metric("longest_run", &input).value, 3.0);
    }

    #[test]
    fn calculate_all_metrics_partitions_errors() {
        let all = BuiltinCatalog.calculate_all_metrics(&bits("1010"));
        assert_eq!(all.metrics.len(), METRICS.len());
        assert!(all.errors.is_empty());
    }
}
