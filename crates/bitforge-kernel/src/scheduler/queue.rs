//! Pending-queue ordering and dependency checks.

use std::collections::HashMap;

use bitforge_types::{Job, JobId, JobStatus};

/// Admission order over pending jobs: priority rank first
/// (critical < high < normal < low), creation time ascending within a
/// rank, job id as the final stable tiebreaker.
pub fn admission_order<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Vec<JobId> {
    let mut pending: Vec<&Job> = jobs
        .into_iter()
        .filter(|job| job.status == JobStatus::Pending)
        .collect();
    pending.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    pending.into_iter().map(|job| job.id).collect()
}

/// True when every dependency of `job` is archived as completed.
pub fn dependencies_met(job: &Job, archive: &HashMap<JobId, Job>) -> bool {
    job.depends_on.iter().all(|dep| {
        archive
            .get(dep)
            .map(|archived| archived.status == JobStatus::Completed)
            .unwrap_or(false)
    })
}
