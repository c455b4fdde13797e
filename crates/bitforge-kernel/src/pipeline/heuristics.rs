//! Score and verdict extraction from stage logs.
//!
//! Scoring and policy scripts report through their log stream: the engine
//! scans log lines for a "score" line and takes its first numeric token,
//! and looks for "pass"/"fail" tokens for the advisory policy verdict.
//! This free-text heuristic is preserved exactly for output compatibility
//! with existing stage scripts; a structured return channel would be the
//! better design and both extractors are kept behind this module so one
//! could replace them.

use regex::Regex;

/// Extract the score from a scoring file's log: the first line containing
/// "score" (case-insensitive) contributes its first numeric token.
pub fn extract_score(log: &[String]) -> Option<f64> {
    let number = Regex::new(r"-?\d+(?:\.\d+)?").expect("static regex");
    for line in log {
        if !line.to_lowercase().contains("score") {
            continue;
        }
        if let Some(m) = number.find(line) {
            if let Ok(value) = m.as_str().parse() {
                return Some(value);
            }
        }
    }
    None
}

/// Extract the advisory verdict from a policy file's log: the first line
/// containing "fail" decides failure, otherwise the first line containing
/// "pass" decides success. A silent policy file yields no verdict.
pub fn extract_verdict(log: &[String]) -> Option<bool> {
    for line in log {
        let lower = line.to_lowercase();
        if lower.contains("fail") {
            return Some(false);
        }
        if lower.contains("pass") {
            return Some(true);
        }
    }
    None
}
