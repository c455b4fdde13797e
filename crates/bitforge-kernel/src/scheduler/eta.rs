//! Completion estimates from elapsed time and percent progress.

use bitforge_types::{EtaConfidence, EtaEstimate};
use chrono::{Duration, Utc};

/// Estimate time remaining for a job at `progress` percent after
/// `elapsed_ms` of runtime.
///
/// The estimate extrapolates the average time per percent; confidence is
/// low below 10% progress, medium below 50%, high from there on. Returns
/// `None` until there is any progress to extrapolate from.
pub fn estimate_eta(progress: f64, elapsed_ms: f64) -> Option<EtaEstimate> {
    if progress <= 0.0 || elapsed_ms < 0.0 {
        return None;
    }
    let avg_ms_per_percent = elapsed_ms / progress;
    let estimated_ms = (100.0 - progress).max(0.0) * avg_ms_per_percent;
    let confidence = if progress < 10.0 {
        EtaConfidence::Low
    } else if progress < 50.0 {
        EtaConfidence::Medium
    } else {
        EtaConfidence::High
    };
    Some(EtaEstimate {
        estimated_ms,
        estimated_completion: Utc::now() + Duration::milliseconds(estimated_ms as i64),
        formatted: format_duration_ms(estimated_ms),
        confidence,
    })
}

/// Render a millisecond count as a compact human duration.
pub fn format_duration_ms(ms: f64) -> String {
    if ms < 1000.0 {
        return "<1s".to_string();
    }
    let total_secs = (ms / 1000.0).round() as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
