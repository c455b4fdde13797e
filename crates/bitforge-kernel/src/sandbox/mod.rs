//! Script sandbox — the bounded bridge API and the interpreter seam.
//!
//! One untrusted script runs against one [`SandboxBridge`], which owns the
//! shared bits buffer and budget counter for that run and records every
//! mutation as a `Transformation`. The script side is fully decoupled: it
//! exchanges serializable requests/responses through a single dispatch
//! entry point.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ dyn Interpreter (primary, or RestrictedInterpreter)      │
//! │        │ BridgeRequest        ↑ BridgeResponse           │
//! │        ▼                      │                          │
//! │ SandboxBridge { bits, budget, log, ledger }              │
//! │        │ execute_operation / calculate_metric            │
//! │        ▼                                                 │
//! │ dyn OperationCatalog / dyn MetricCatalog                 │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod bridge;
mod interpreter;
mod restricted;

pub use bridge::{BridgeRequest, BridgeResponse, BridgeState, SandboxBridge};
pub use interpreter::{select_interpreter, Interpreter, InterpreterSelection, ScriptError};
pub use restricted::RestrictedInterpreter;
