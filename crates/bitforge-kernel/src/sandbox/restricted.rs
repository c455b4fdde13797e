//! The restricted fallback interpreter.
//!
//! A line-oriented pattern matcher recognizing only a safe statement
//! subset: `print`/`log`, `apply_operation`, `apply_operation_range`, and
//! `deduct_budget`, each optionally prefixed with the injected module name
//! (`bridge.`). Anything else is a parse error that aborts the stage —
//! under degraded mode there is no way to run arbitrary script constructs
//! safely, so none are accepted.

use async_trait::async_trait;
use regex::Regex;

use super::bridge::{BridgeRequest, BridgeResponse, SandboxBridge};
use super::interpreter::{Interpreter, ScriptError};

/// Pattern-matching interpreter for the safe statement subset.
pub struct RestrictedInterpreter {
    log_stmt: Regex,
    apply_stmt: Regex,
    apply_range_stmt: Regex,
    deduct_stmt: Regex,
}

impl RestrictedInterpreter {
    pub fn new() -> Self {
        // Statements are one per line; an optional trailing semicolon is
        // stripped before matching.
        Self {
            log_stmt: Regex::new(r#"^(?:bridge\.)?(?:log|print)\(\s*"((?:[^"\\]|\\.)*)"\s*\)$"#)
                .expect("static regex"),
            apply_stmt: Regex::new(
                r#"^(?:bridge\.)?apply_operation\(\s*"([A-Za-z0-9_]+)"\s*(?:,\s*(\{.*\}))?\s*\)$"#,
            )
            .expect("static regex"),
            apply_range_stmt: Regex::new(
                r#"^(?:bridge\.)?apply_operation_range\(\s*"([A-Za-z0-9_]+)"\s*,\s*(\d+)\s*,\s*(\d+)\s*(?:,\s*(\{.*\}))?\s*\)$"#,
            )
            .expect("static regex"),
            deduct_stmt: Regex::new(r"^(?:bridge\.)?deduct_budget\(\s*(\d+(?:\.\d+)?)\s*\)$")
                .expect("static regex"),
        }
    }

    fn parse_params(raw: Option<&str>, line: usize) -> Result<Option<serde_json::Value>, ScriptError> {
        match raw {
            None => Ok(None),
            Some(text) => serde_json::from_str(text)
                .map(Some)
                .map_err(|e| ScriptError::Parse { line, message: format!("bad params: {e}") }),
        }
    }
}

impl Default for RestrictedInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interpreter for RestrictedInterpreter {
    fn name(&self) -> &str {
        "restricted"
    }

    async fn execute(&self, script: &str, bridge: &mut SandboxBridge) -> Result<(), ScriptError> {
        for (idx, raw_line) in script.lines().enumerate() {
            let line_number = idx + 1;
            let line = raw_line.trim().trim_end_matches(';').trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(caps) = self.log_stmt.captures(line) {
                let message = caps[1].replace("\\\"", "\"").replace("\\\\", "\\");
                bridge.dispatch(BridgeRequest::Log { message });
                continue;
            }

            if let Some(caps) = self.apply_stmt.captures(line) {
                let params = Self::parse_params(caps.get(2).map(|m| m.as_str()), line_number)?;
                bridge.dispatch(BridgeRequest::ApplyOperation {
                    name: caps[1].to_string(),
                    bits: None,
                    params,
                });
                continue;
            }

            if let Some(caps) = self.apply_range_stmt.captures(line) {
                let params = Self::parse_params(caps.get(4).map(|m| m.as_str()), line_number)?;
                let start: usize = caps[2].parse().map_err(|_| ScriptError::Parse {
                    line: line_number,
                    message: "bad range start".into(),
                })?;
                let end: usize = caps[3].parse().map_err(|_| ScriptError::Parse {
                    line: line_number,
                    message: "bad range end".into(),
                })?;
                bridge.dispatch(BridgeRequest::ApplyOperationRange {
                    name: caps[1].to_string(),
                    start,
                    end,
                    params,
                });
                continue;
            }

            if let Some(caps) = self.deduct_stmt.captures(line) {
                let amount: f64 = caps[1].parse().map_err(|_| ScriptError::Parse {
                    line: line_number,
                    message: "bad amount".into(),
                })?;
                if let BridgeResponse::Budget { accepted: false, .. } =
                    bridge.dispatch(BridgeRequest::DeductBudget { amount })
                {
                    bridge.push_log(format!("deduct_budget({amount}) rejected: insufficient budget"));
                }
                continue;
            }

            return Err(ScriptError::Parse {
                line: line_number,
                message: format!("unrecognized statement: {line}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::BuiltinCatalog;
    use crate::pipeline::CostTable;

    fn bridge(bits: &str) -> SandboxBridge {
        SandboxBridge::new(
            bits.parse().unwrap(),
            100.0,
            Arc::new(BuiltinCatalog),
            Arc::new(BuiltinCatalog),
            CostTable::default(),
            true,
        )
    }

    #[tokio::test]
    async fn executes_the_safe_subset() {
        let script = r#"
            # invert, then report
            apply_operation("not")
            bridge.apply_operation_range("not", 0, 2);
            print("score: 42")
            deduct_budget(10)
        "#;
        let mut bridge = bridge("11110000");
        RestrictedInterpreter::new().execute(script, &mut bridge).await.unwrap();

        let state = bridge.finish();
        assert_eq!(state.bits.to_string(), "11001111");
        assert_eq!(state.ledger.len(), 2);
        assert!(state.log.contains(&"score: 42".to_string()));
        // two not calls at 1.0 each plus the explicit 10
        assert_eq!(state.budget, 88.0);
    }

    #[tokio::test]
    async fn params_are_passed_through() {
        let script = r#"apply_operation("shift_left", {"amount": 2})"#;
        let mut bridge = bridge("10110000");
        RestrictedInterpreter::new().execute(script, &mut bridge).await.unwrap();
        assert_eq!(bridge.bits().to_string(), "11000000");
    }

    #[tokio::test]
    async fn unrecognized_statement_aborts_with_line_number() {
        let script = "log(\"ok\")\nimport os\n";
        let mut bridge = bridge("1010");
        let err = RestrictedInterpreter::new().execute(script, &mut bridge).await.unwrap_err();
        match err {
            ScriptError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("import os"));
            }
            other => panic!("expected parse error, got {other}"),
        }
        // The log line before the failure is kept.
        assert_eq!(bridge.log(), ["ok"]);
    }

    #[tokio::test]
    async fn bad_params_json_is_a_parse_error() {
        let script = r#"apply_operation("not", {broken)"#;
        let mut bridge = bridge("1010");
        let err = RestrictedInterpreter::new().execute(script, &mut bridge).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn rejected_deduction_is_logged() {
        let script = "deduct_budget(500)";
        let mut bridge = bridge("1010");
        RestrictedInterpreter::new().execute(script, &mut bridge).await.unwrap();
        assert!(bridge.log()[0].contains("rejected"));
        assert_eq!(bridge.budget(), 100.0);
    }
}
