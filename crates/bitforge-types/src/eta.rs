//! Completion estimates derived from elapsed time and percent progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much to trust an estimate.
///
/// Early estimates extrapolate from very little data, so confidence grows
/// with progress: low below 10%, medium below 50%, high from there on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EtaConfidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for EtaConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EtaConfidence::Low => write!(f, "low"),
            EtaConfidence::Medium => write!(f, "medium"),
            EtaConfidence::High => write!(f, "high"),
        }
    }
}

/// A point-in-time completion estimate for a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaEstimate {
    /// Estimated milliseconds remaining.
    pub estimated_ms: f64,
    /// Wall-clock completion time.
    pub estimated_completion: DateTime<Utc>,
    /// Human-readable remaining time, e.g. "3m 20s".
    pub formatted: String,
    /// How much to trust this estimate.
    pub confidence: EtaConfidence,
}
