//! The pluggable script interpreter capability.
//!
//! The embedded interpreter runtime is an external collaborator: the kernel
//! only depends on the [`Interpreter`] trait. At startup exactly one
//! implementation is selected — the embedder's primary interpreter when one
//! is available, otherwise the restricted pattern-matching fallback — and
//! results produced under the fallback are flagged as degraded.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::bridge::SandboxBridge;
use super::restricted::RestrictedInterpreter;

/// Script execution errors. Aborts only the stage it occurred in.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("script error: {0}")]
    Runtime(String),
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),
}

/// A script interpreter.
///
/// Implementations execute one script against one bridge and must not keep
/// state across calls — every run sees a fresh bridge, and anything a
/// script printed to stdout/stderr must be folded into the bridge log
/// (`Log` requests) rather than leaked to the host's streams.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Execute `script` against `bridge`. An `Err` aborts the stage; the
    /// bridge state accumulated before the failure is kept.
    async fn execute(&self, script: &str, bridge: &mut SandboxBridge) -> Result<(), ScriptError>;
}

/// The interpreter chosen for a kernel instance.
#[derive(Clone)]
pub struct InterpreterSelection {
    /// The interpreter every stage run uses.
    pub interpreter: Arc<dyn Interpreter>,
    /// True when the restricted fallback was selected; results carry this
    /// as `degraded_interpreter`.
    pub degraded: bool,
}

/// Select the interpreter for a kernel instance.
///
/// The primary interpreter wins when present; otherwise the restricted
/// fallback is selected and the choice is logged.
pub fn select_interpreter(primary: Option<Arc<dyn Interpreter>>) -> InterpreterSelection {
    match primary {
        Some(interpreter) => {
            tracing::debug!(interpreter = interpreter.name(), "using primary interpreter");
            InterpreterSelection { interpreter, degraded: false }
        }
        None => {
            let fallback = Arc::new(RestrictedInterpreter::new());
            tracing::warn!(
                "primary interpreter unavailable, falling back to restricted pattern matching"
            );
            InterpreterSelection { interpreter: fallback, degraded: true }
        }
    }
}
