//! Strategy execution pipeline.
//!
//! A pipeline run walks a strategy's stage files in fixed order —
//! Scheduler, then Algorithms, then Scoring, then Policy — threading the
//! bits buffer and the budget across stages and aggregating everything
//! into one immutable `ExecutionPipelineResult`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ExecutionEngine                         │
//! │  Scheduler ──▶ Algorithm* ──▶ Scoring* ──▶ Policy*           │
//! │   (fatal)      (mutates,      (read-only,   (read-only,      │
//! │                 charged)       score)        pass/fail)      │
//! │        each stage = StageRunner + fresh SandboxBridge        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod cost;
mod engine;
mod heuristics;
mod replay;
mod stage;

pub use cost::{CostTable, DEFAULT_BUDGET, DEFAULT_OPERATION_COST};
pub use engine::ExecutionEngine;
pub use heuristics::{extract_score, extract_verdict};
pub use replay::{replay_transformations, ReplayError};
pub use stage::{StageOutcome, StageRunner};
