//! Recorded transformations — the unit of deterministic replay.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bits::BitBuffer;

/// Synthetic operation id used when a script writes bits directly through
/// `set_bit`/`set_bits` rather than through a catalog operation. Replay
/// splices the recorded segment instead of invoking the catalog.
pub const RAW_WRITE_OPERATION: &str = "set_bits";

/// A half-open bit range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BitRange {
    pub start: usize,
    pub end: usize,
}

impl BitRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Number of bits covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl std::fmt::Display for BitRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Where a recorded invocation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TransformTarget {
    /// The whole shared buffer was replaced by the operation output.
    Full,
    /// Exactly `[start, end)` of the shared buffer was spliced.
    Range { start: usize, end: usize },
    /// A scratch computation on caller-supplied bits; the shared buffer
    /// was not touched and replay skips the entry.
    Scratch,
}

impl TransformTarget {
    /// The affected range of the shared buffer, if any.
    pub fn affected_range(&self, buffer_len: usize) -> Option<BitRange> {
        match self {
            TransformTarget::Full => Some(BitRange::new(0, buffer_len)),
            TransformTarget::Range { start, end } => Some(BitRange::new(*start, *end)),
            TransformTarget::Scratch => None,
        }
    }

    /// True if the invocation mutated the shared buffer.
    pub fn is_applied(&self) -> bool {
        !matches!(self, TransformTarget::Scratch)
    }
}

/// One recorded operation invocation with full before/after state.
///
/// Transformations are append-only and immutable within one run. Replaying
/// the ordered list from the initial bits deterministically reproduces the
/// final bits; the `after_full` field additionally lets a player reconstruct
/// every intermediate state without re-executing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    /// Catalog operation id (or [`RAW_WRITE_OPERATION`]).
    pub operation: String,
    /// Params as the operation actually resolved them, defaults included.
    pub resolved_params: serde_json::Value,
    /// Whether the call spliced the full buffer, a range, or scratch bits.
    pub target: TransformTarget,
    /// Full shared buffer before the call.
    pub before_full: BitBuffer,
    /// Full shared buffer after the call.
    pub after_full: BitBuffer,
    /// The touched segment before the call (scratch input for scratch calls).
    pub before_segment: BitBuffer,
    /// The touched segment after the call (scratch output for scratch calls).
    pub after_segment: BitBuffer,
    /// Positions that differ between the segment views.
    pub bits_changed: usize,
    /// Cost charged for this invocation from the static cost table.
    pub cost: f64,
    /// Wall-clock duration of the operation call, in milliseconds.
    pub duration_ms: f64,
    /// Metrics snapshot taken immediately after the mutation.
    pub metrics: BTreeMap<String, f64>,
}
