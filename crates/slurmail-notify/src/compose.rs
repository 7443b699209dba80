//! Notification subject and body composition.
//!
//! The wording here is load-bearing: downstream mail filters key on the
//! `[SLURM]` subject prefix and the SUCCESS/FAILED status token.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A composed notification, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Compose the job-start notification.
pub fn job_started(
    job_id: &str,
    job_name: &str,
    started_at: DateTime<Local>,
    queued: &str,
) -> Notification {
    let subject = format!(
        "[SLURM] Job {} ({}) started (queued {})",
        job_name, job_id, queued
    );
    let body = format!(
        "SLURM Job Started\n\nJob ID: {}\nJob Name: {}\nStart Time: {}\nTime in Queue: {}\n",
        job_id,
        job_name,
        started_at.format("%Y-%m-%d %H:%M:%S"),
        queued
    );
    Notification { subject, body }
}

/// Compose the job-finish notification. Exit code zero reads as
/// SUCCESS, anything else as FAILED.
pub fn job_finished(
    job_id: &str,
    job_name: &str,
    finished_at: DateTime<Local>,
    exit_code: i32,
    runtime: &str,
) -> Notification {
    let status = if exit_code == 0 { "SUCCESS" } else { "FAILED" };
    let subject = format!(
        "[SLURM] Job {} ({}) {} (runtime {})",
        job_name, job_id, status, runtime
    );
    let body = format!(
        "SLURM Job Finished\n\nJob ID: {}\nJob Name: {}\nStatus: {}\nExit Code: {}\nEnd Time: {}\nRuntime: {}\n",
        job_id,
        job_name,
        status,
        exit_code,
        finished_at.format("%Y-%m-%d %H:%M:%S"),
        runtime
    );
    Notification { subject, body }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    #[test]
    fn start_subject_and_body() {
        let n = job_started("12345", "train_model", local(2025, 3, 14, 9, 26, 53), "2m 5s");
        assert_eq!(
            n.subject,
            "[SLURM] Job train_model (12345) started (queued 2m 5s)"
        );
        assert_eq!(
            n.body,
            "SLURM Job Started\n\n\
             Job ID: 12345\n\
             Job Name: train_model\n\
             Start Time: 2025-03-14 09:26:53\n\
             Time in Queue: 2m 5s\n"
        );
    }

    #[test]
    fn finish_success_subject_and_body() {
        let n = job_finished(
            "12345",
            "train_model",
            local(2025, 3, 14, 11, 0, 7),
            0,
            "1h 33m",
        );
        assert_eq!(
            n.subject,
            "[SLURM] Job train_model (12345) SUCCESS (runtime 1h 33m)"
        );
        assert_eq!(
            n.body,
            "SLURM Job Finished\n\n\
             Job ID: 12345\n\
             Job Name: train_model\n\
             Status: SUCCESS\n\
             Exit Code: 0\n\
             End Time: 2025-03-14 11:00:07\n\
             Runtime: 1h 33m\n"
        );
    }

    #[test]
    fn finish_nonzero_exit_reads_failed() {
        let n = job_finished("9", "quick", local(2025, 6, 1, 12, 0, 0), 137, "12s");
        assert_eq!(n.subject, "[SLURM] Job quick (9) FAILED (runtime 12s)");
        assert!(n.body.contains("Status: FAILED\n"));
        assert!(n.body.contains("Exit Code: 137\n"));
    }

    #[test]
    fn body_ends_with_newline() {
        let n = job_started("1", "j", local(2025, 1, 1, 0, 0, 1), "0s");
        assert!(n.body.ends_with('\n'));
        assert!(!n.body.ends_with("\n\n"));
    }
}
