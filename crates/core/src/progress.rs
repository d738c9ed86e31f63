//! Progress and completion-time arithmetic.

use chrono::Duration;

use crate::job_status::JobStatus;
use crate::types::Timestamp;

/// Progress value of a finished job.
pub const PROGRESS_COMPLETE: i16 = 100;

/// Integer percentage of `completed` out of `total`, clamped to `0..=100`.
///
/// An empty plan counts as fully done.
pub fn percent_complete(completed: usize, total: usize) -> i16 {
    if total == 0 {
        return PROGRESS_COMPLETE;
    }
    let pct = completed.saturating_mul(100) / total;
    pct.min(100) as i16
}

/// Clamp a reported progress value so it never moves backwards and stays
/// within `0..=100`.
pub fn next_progress(current: i16, reported: i16) -> i16 {
    reported.clamp(0, PROGRESS_COMPLETE).max(current)
}

/// Estimate when a job will finish by extrapolating elapsed time from its
/// progress.
///
/// - completed jobs report `updated_at`;
/// - failed / cancelled jobs and jobs with no progress report `None`.
pub fn estimate_completion(
    status: JobStatus,
    progress: i16,
    created_at: Timestamp,
    updated_at: Timestamp,
    now: Timestamp,
) -> Option<Timestamp> {
    match status {
        JobStatus::Completed => Some(updated_at),
        JobStatus::Failed | JobStatus::Cancelled => None,
        JobStatus::Pending | JobStatus::Running => {
            if progress <= 0 {
                return None;
            }
            let elapsed_ms = (now - created_at).num_milliseconds().max(0);
            let total_ms = elapsed_ms * 100 / i64::from(progress);
            let remaining_ms = total_ms - elapsed_ms;
            (remaining_ms > 0).then(|| now + Duration::milliseconds(remaining_ms))
        }
    }
}
