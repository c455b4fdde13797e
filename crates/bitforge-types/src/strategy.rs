//! Strategy configuration — the ordered stage files one pipeline run executes.

use serde::{Deserialize, Serialize};

/// One of the four fixed pipeline stages.
///
/// Stages always execute in declaration order: the single scheduler first,
/// then every algorithm, then every scoring file, then every policy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Advisory scheduling hints; runs first, failure is pipeline-fatal.
    Scheduler,
    /// Mutates the shared buffer; charged against the budget.
    Algorithm,
    /// Read-only; contributes a score extracted from its log.
    Scoring,
    /// Read-only; contributes an advisory pass/fail verdict.
    Policy,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Scheduler => write!(f, "scheduler"),
            StageKind::Algorithm => write!(f, "algorithm"),
            StageKind::Scoring => write!(f, "scoring"),
            StageKind::Policy => write!(f, "policy"),
        }
    }
}

/// Configuration for one strategy: a named bundle of stage script files.
///
/// Exactly one scheduler file is required; algorithm, scoring, and policy
/// files are optional and run in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy id, unique within one strategy store.
    pub id: String,
    /// Display name.
    pub name: String,
    /// The single required scheduler script.
    pub scheduler_file: String,
    /// Algorithm scripts, executed in order against the shared buffer.
    #[serde(default)]
    pub algorithm_files: Vec<String>,
    /// Scoring scripts, executed read-only in order.
    #[serde(default)]
    pub scoring_files: Vec<String>,
    /// Policy scripts, executed read-only in order.
    #[serde(default)]
    pub policy_files: Vec<String>,
}

impl StrategyConfig {
    /// Create a strategy with only the required scheduler file.
    pub fn new(id: impl Into<String>, name: impl Into<String>, scheduler_file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scheduler_file: scheduler_file.into(),
            algorithm_files: Vec::new(),
            scoring_files: Vec::new(),
            policy_files: Vec::new(),
        }
    }

    /// Append an algorithm file.
    pub fn with_algorithm(mut self, file: impl Into<String>) -> Self {
        self.algorithm_files.push(file.into());
        self
    }

    /// Append a scoring file.
    pub fn with_scoring(mut self, file: impl Into<String>) -> Self {
        self.scoring_files.push(file.into());
        self
    }

    /// Append a policy file.
    pub fn with_policy(mut self, file: impl Into<String>) -> Self {
        self.policy_files.push(file.into());
        self
    }

    /// All stage files in execution order, paired with their stage kind.
    pub fn stage_files(&self) -> Vec<(StageKind, &str)> {
        let mut files = vec![(StageKind::Scheduler, self.scheduler_file.as_str())];
        files.extend(self.algorithm_files.iter().map(|f| (StageKind::Algorithm, f.as_str())));
        files.extend(self.scoring_files.iter().map(|f| (StageKind::Scoring, f.as_str())));
        files.extend(self.policy_files.iter().map(|f| (StageKind::Policy, f.as_str())));
        files
    }
}
