//! Deterministic replay of a transformation ledger.

use bitforge_types::{BitBuffer, TransformTarget, Transformation, RAW_WRITE_OPERATION};
use thiserror::Error;

use crate::catalog::OperationCatalog;

/// Replay failures. These indicate a corrupt ledger or a catalog that
/// violated the determinism contract, not a user error.
#[derive(Debug, Clone, Error)]
pub enum ReplayError {
    #[error("replay of '{operation}' at index {index} failed: {message}")]
    OperationFailed { index: usize, operation: String, message: String },
    #[error("replay splice at index {index} out of range")]
    SpliceOutOfRange { index: usize },
}

/// Re-execute a recorded ledger in order from `initial`, returning the
/// reconstructed final buffer.
///
/// Catalog operations are re-invoked with their recorded resolved params;
/// raw writes are replayed by splicing their recorded segment; scratch
/// entries never touched the shared buffer and are skipped.
pub fn replay_transformations(
    catalog: &dyn OperationCatalog,
    initial: &BitBuffer,
    ledger: &[Transformation],
) -> Result<BitBuffer, ReplayError> {
    let mut bits = initial.clone();
    for (index, t) in ledger.iter().enumerate() {
        match t.target {
            TransformTarget::Scratch => continue,
            TransformTarget::Range { start, .. } if t.operation == RAW_WRITE_OPERATION => {
                if !bits.splice(start, &t.after_segment) {
                    return Err(ReplayError::SpliceOutOfRange { index });
                }
            }
            TransformTarget::Range { start, end } => {
                let outcome = catalog.execute_operation_on_range(
                    &t.operation,
                    &bits,
                    start,
                    end,
                    Some(&t.resolved_params),
                );
                if !outcome.success {
                    return Err(ReplayError::OperationFailed {
                        index,
                        operation: t.operation.clone(),
                        message: outcome.error.unwrap_or_else(|| "operation failed".into()),
                    });
                }
                bits = outcome.bits;
            }
            TransformTarget::Full => {
                let outcome =
                    catalog.execute_operation(&t.operation, &bits, Some(&t.resolved_params));
                if !outcome.success {
                    return Err(ReplayError::OperationFailed {
                        index,
                        operation: t.operation.clone(),
                        message: outcome.error.unwrap_or_else(|| "operation failed".into()),
                    });
                }
                bits = outcome.bits;
            }
        }
    }
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::pipeline::CostTable;
    use crate::sandbox::{BridgeRequest, SandboxBridge};

    /// Drive a bridge through a mixed mutation sequence and check the
    /// ledger replays to the same final buffer.
    #[test]
    fn mixed_ledger_replays_exactly() {
        let initial: BitBuffer = "11110000".parse().unwrap();
        let mut bridge = SandboxBridge::new(
            initial.clone(),
            1000.0,
            Arc::new(BuiltinCatalog),
            Arc::new(BuiltinCatalog),
            CostTable::default(),
            true,
        );
        bridge.dispatch(BridgeRequest::ApplyOperation { name: "not".into(), bits: None, params: None });
        bridge.dispatch(BridgeRequest::ApplyOperationRange {
            name: "reverse".into(),
            start: 1,
            end: 5,
            params: None,
        });
        bridge.dispatch(BridgeRequest::SetBits { start: 6, bits: "10".parse().unwrap() });
        // A scratch call that must not affect replay.
        bridge.dispatch(BridgeRequest::ApplyOperation {
            name: "not".into(),
            bits: Some("111".parse().unwrap()),
            params: None,
        });

        let state = bridge.finish();
        let replayed = replay_transformations(&BuiltinCatalog, &initial, &state.ledger).unwrap();
        assert_eq!(replayed, state.bits);
    }

    #[test]
    fn replay_with_unknown_operation_reports_index() {
        let initial: BitBuffer = "1010".parse().unwrap();
        let ledger = vec![Transformation {
            operation: "gone".into(),
            resolved_params: serde_json::Value::Null,
            target: TransformTarget::Full,
            before_full: initial.clone(),
            after_full: initial.clone(),
            before_segment: initial.clone(),
            after_segment: initial.clone(),
            bits_changed: 0,
            cost: 1.0,
            duration_ms: 0.0,
            metrics: Default::default(),
        }];
        let err = replay_transformations(&BuiltinCatalog, &initial, &ledger).unwrap_err();
        assert!(matches!(err, ReplayError::OperationFailed { index: 0, .. }));
    }
}
