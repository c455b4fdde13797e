//! Shared test fixtures for bitforge.
//!
//! Canned stage scripts, a fixture seeder for the common invert strategy,
//! and a deliberately slow interpreter for scheduling tests that need
//! iterations with a predictable duration.

use std::time::Duration;

use async_trait::async_trait;
use bitforge_kernel::sandbox::{Interpreter, RestrictedInterpreter, SandboxBridge, ScriptError};
use bitforge_kernel::Workbench;
use bitforge_types::{BitBuffer, FileHandle, StrategyConfig};

/// A scheduler stage that only logs its plan.
pub const SCHEDULER_SCRIPT: &str = "log(\"plan: run stages in order\")";

/// An algorithm stage inverting the full buffer once.
pub const INVERT_SCRIPT: &str = "apply_operation(\"not\")";

/// A scoring stage reporting a fixed score of 7.
pub const SCORE_SCRIPT: &str = "print(\"score: 7\")";

/// A policy stage that passes.
pub const POLICY_PASS_SCRIPT: &str = "print(\"all checks pass\")";

/// A policy stage that fails (advisory only).
pub const POLICY_FAIL_SCRIPT: &str = "print(\"length check failed\")";

/// A script the restricted interpreter rejects at line 1.
pub const BROKEN_SCRIPT: &str = "while true: pass";

/// Parse a bit string, panicking on bad input. Test-only convenience.
pub fn bits(s: &str) -> BitBuffer {
    s.parse().expect("valid bit string")
}

/// Seed a workbench with the standard invert fixture: scheduler + invert
/// algorithm + scoring + passing policy under strategy id `invert`, and an
/// 8-bit source buffer `11110000`. Returns the source handle.
pub async fn seed_invert_fixture(bench: &Workbench) -> FileHandle {
    bench.add_script("sched.bf", SCHEDULER_SCRIPT).await;
    bench.add_script("invert.bf", INVERT_SCRIPT).await;
    bench.add_script("score.bf", SCORE_SCRIPT).await;
    bench.add_script("policy.bf", POLICY_PASS_SCRIPT).await;
    bench
        .register_strategy(
            StrategyConfig::new("invert", "Invert", "sched.bf")
                .with_algorithm("invert.bf")
                .with_scoring("score.bf")
                .with_policy("policy.bf"),
        )
        .await;
    bench.create_source("source", bits("11110000")).await
}

/// An interpreter that sleeps before delegating to the restricted one.
///
/// Gives every stage a predictable minimum duration so scheduling tests
/// can pause/cancel jobs while they are genuinely mid-run.
pub struct SlowInterpreter {
    delay: Duration,
    inner: RestrictedInterpreter,
}

impl SlowInterpreter {
    pub fn new(delay: Duration) -> Self {
        Self { delay, inner: RestrictedInterpreter::new() }
    }
}

#[async_trait]
impl Interpreter for SlowInterpreter {
    fn name(&self) -> &str {
        "slow-test"
    }

    async fn execute(&self, script: &str, bridge: &mut SandboxBridge) -> Result<(), ScriptError> {
        tokio::time::sleep(self.delay).await;
        self.inner.execute(script, bridge).await
    }
}
