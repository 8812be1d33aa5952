//! Progress accounting and the payloads emitted to observers.

use serde::Serialize;

use crate::job::{ImageResult, Job, JobStatus, ResultStatus};
use crate::job_events::{EVENT_DONE, EVENT_PROGRESS};
use crate::types::JobId;

/// Per-status slot counts for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounts {
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub total: usize,
}

impl ProgressCounts {
    pub fn from_results(results: &[ImageResult]) -> Self {
        let mut counts = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                ResultStatus::Completed => counts.completed += 1,
                ResultStatus::Failed => counts.failed += 1,
                ResultStatus::Running => counts.running += 1,
            }
        }
        counts
    }

    pub fn of(job: &Job) -> Self {
        Self::from_results(job.results())
    }
}

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// Payload of a `progress` event: one slot left `running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressPayload {
    pub index: usize,
    pub status: ResultStatus,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl ProgressPayload {
    pub fn from_result(index: usize, result: &ImageResult) -> Self {
        Self {
            index,
            status: result.status,
            url: result.url.clone(),
            error: result.error.clone(),
        }
    }
}

/// Payload of the final `done` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DonePayload {
    pub status: JobStatus,
    pub total_ms: Option<u64>,
    pub ttfi_ms: Option<u64>,
    pub completed_count: usize,
    pub failed_count: usize,
}

impl DonePayload {
    pub fn from_job(job: &Job) -> Self {
        let counts = ProgressCounts::of(job);
        Self {
            status: job.status(),
            total_ms: job.total_ms(),
            ttfi_ms: job.ttfi_ms(),
            completed_count: counts.completed,
            failed_count: counts.failed,
        }
    }
}

/// One event of a job's progress stream.
///
/// Serializes as `{"type": "progress" | "done", "payload": {...}}`, which is
/// the WebSocket frame shape. SSE uses [`StreamEvent::name`] as the event
/// name and [`StreamEvent::payload_json`] as the data line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum StreamEvent {
    Progress(ProgressPayload),
    Done(DonePayload),
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => EVENT_PROGRESS,
            Self::Done(_) => EVENT_DONE,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// The bare payload, without the `type` envelope.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Progress(p) => serde_json::to_string(p),
            Self::Done(d) => serde_json::to_string(d),
        }
    }
}

// ---------------------------------------------------------------------------
// Pull presentations
// ---------------------------------------------------------------------------

/// Full job state plus counts, returned by the polling endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub job: Job,
    pub progress: ProgressCounts,
}

impl From<Job> for JobSnapshot {
    fn from(job: Job) -> Self {
        let progress = ProgressCounts::of(&job);
        Self { job, progress }
    }
}

/// Timing and count summary for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobMetrics {
    pub job_id: JobId,
    pub status: JobStatus,
    pub ttfi_ms: Option<u64>,
    pub total_ms: Option<u64>,
    pub completed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
}

impl From<&Job> for JobMetrics {
    fn from(job: &Job) -> Self {
        let counts = ProgressCounts::of(job);
        Self {
            job_id: job.id().to_string(),
            status: job.status(),
            ttfi_ms: job.ttfi_ms(),
            total_ms: job.total_ms(),
            completed_count: counts.completed,
            failed_count: counts.failed,
            total_count: counts.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SlotOutcome;

    fn settled_job() -> Job {
        let mut job = Job::new("a cat", 3);
        job.start().unwrap();
        job.record_result(
            0,
            SlotOutcome::Succeeded {
                url: "https://img/0.png".into(),
            },
        )
        .unwrap();
        job.record_result(
            2,
            SlotOutcome::Failed {
                error: "nope".into(),
            },
        )
        .unwrap();
        job
    }

    #[test]
    fn counts_cover_every_slot() {
        let counts = ProgressCounts::of(&settled_job());
        assert_eq!(
            counts,
            ProgressCounts {
                completed: 1,
                failed: 1,
                running: 1,
                total: 3,
            }
        );
    }

    #[test]
    fn progress_event_uses_type_payload_envelope() {
        let job = settled_job();
        let event = StreamEvent::Progress(ProgressPayload::from_result(0, &job.results()[0]));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "progress");
        assert_eq!(json["payload"]["index"], 0);
        assert_eq!(json["payload"]["status"], "completed");
        assert_eq!(json["payload"]["url"], "https://img/0.png");
        assert!(json["payload"]["error"].is_null());
    }

    #[test]
    fn done_payload_carries_counts_and_timings() {
        let mut job = settled_job();
        job.record_result(
            1,
            SlotOutcome::Failed {
                error: "again".into(),
            },
        )
        .unwrap();
        job.finish(900, Some(300)).unwrap();

        let event = StreamEvent::Done(DonePayload::from_job(&job));
        assert_eq!(event.name(), "done");
        assert!(event.is_done());

        let payload: serde_json::Value =
            serde_json::from_str(&event.payload_json().unwrap()).unwrap();
        assert_eq!(payload["status"], "completed");
        assert_eq!(payload["total_ms"], 900);
        assert_eq!(payload["ttfi_ms"], 300);
        assert_eq!(payload["completed_count"], 1);
        assert_eq!(payload["failed_count"], 2);
    }

    #[test]
    fn snapshot_flattens_job_fields() {
        let job = settled_job();
        let id = job.id().to_string();
        let json = serde_json::to_value(JobSnapshot::from(job)).unwrap();

        assert_eq!(json["id"], id);
        assert_eq!(json["status"], "running");
        assert_eq!(json["results"].as_array().unwrap().len(), 3);
        assert_eq!(json["progress"]["running"], 1);
    }

    #[test]
    fn metrics_for_running_job_have_no_timings() {
        let job = settled_job();
        let metrics = JobMetrics::from(&job);
        assert_eq!(metrics.total_count, 3);
        assert_eq!(metrics.completed_count, 1);
        assert_eq!(metrics.failed_count, 1);
        assert!(metrics.total_ms.is_none());
        assert!(metrics.ttfi_ms.is_none());
    }
}
