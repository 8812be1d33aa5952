//! Per-subscriber progress streams over the job store.
//!
//! A [`ProgressSubscription`] polls the store, diffs the job's results
//! against the slot indices it has already reported, and yields one
//! `progress` event per newly settled slot. When the job is terminal it
//! yields a single `done` event and ends. If the job disappears the
//! subscription ends without `done`.
//!
//! Subscriptions keep no shared state, so any number of SSE and WebSocket
//! observers can follow the same job independently.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use pixelfan_core::error::CoreError;
use pixelfan_core::job::Job;
use pixelfan_core::progress::{
    DonePayload, JobMetrics, JobSnapshot, ProgressPayload, StreamEvent,
};
use pixelfan_core::types::JobId;
use pixelfan_store::JobStore;

/// Delay between store polls while nothing new has happened.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One observer's view of a job's progress.
pub struct ProgressSubscription {
    store: Arc<JobStore>,
    job_id: JobId,
    reported: HashSet<usize>,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    poll_interval: Duration,
}

impl ProgressSubscription {
    pub fn new(store: Arc<JobStore>, job_id: impl Into<JobId>) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            reported: HashSet::new(),
            pending: VecDeque::new(),
            finished: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The next event, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            match self.store.get(&self.job_id).await {
                Ok(job) => self.collect(&job),
                Err(e) => {
                    tracing::debug!(job_id = %self.job_id, error = %e, "Job vanished, ending stream");
                    self.finished = true;
                    return None;
                }
            }

            if self.pending.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
    }

    /// Adapt into a [`Stream`] for transports that want one.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        futures::stream::unfold(self, |mut sub| async move {
            sub.next().await.map(|event| (event, sub))
        })
    }

    /// Queue events for slots that settled since the last poll, then `done`
    /// if the job is terminal.
    fn collect(&mut self, job: &Job) {
        for (index, result) in job.results().iter().enumerate() {
            if result.is_settled() && self.reported.insert(index) {
                self.pending
                    .push_back(StreamEvent::Progress(ProgressPayload::from_result(index, result)));
            }
        }

        if job.is_terminal() {
            self.pending
                .push_back(StreamEvent::Done(DonePayload::from_job(job)));
            self.finished = true;
        }
    }
}

/// Current job state with progress counts. Stateless.
pub async fn snapshot(store: &JobStore, job_id: &str) -> Result<JobSnapshot, CoreError> {
    Ok(JobSnapshot::from(store.get(job_id).await?))
}

/// Timing and count summary for a job.
pub async fn metrics(store: &JobStore, job_id: &str) -> Result<JobMetrics, CoreError> {
    Ok(JobMetrics::from(&store.get(job_id).await?))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use futures::StreamExt;
    use pixelfan_core::job::{JobStatus, SlotOutcome};

    use super::*;

    const FAST: Duration = Duration::from_millis(5);

    async fn running_job(store: &JobStore, n: u32) -> Job {
        let job = store.create(Job::new("a cat", n)).await.unwrap();
        store.modify(job.id(), |j| j.start()).await.unwrap();
        job
    }

    async fn settle(store: &JobStore, job_id: &str, index: usize, ok: bool) {
        let outcome = if ok {
            SlotOutcome::Succeeded {
                url: format!("https://img.test/{index}.png"),
            }
        } else {
            SlotOutcome::Failed {
                error: "boom".into(),
            }
        };
        store
            .modify(job_id, |j| j.record_result(index, outcome))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reports_each_slot_once_then_done() {
        let store = Arc::new(JobStore::new());
        let job = running_job(&store, 3).await;
        let mut sub = ProgressSubscription::new(store.clone(), job.id()).with_poll_interval(FAST);

        settle(&store, job.id(), 1, true).await;
        assert_matches!(sub.next().await, Some(StreamEvent::Progress(p)) if p.index == 1);

        settle(&store, job.id(), 0, false).await;
        settle(&store, job.id(), 2, true).await;
        store
            .modify(job.id(), |j| j.finish(42, Some(7)))
            .await
            .unwrap();

        let rest: Vec<StreamEvent> = sub.into_stream().collect().await;
        assert_eq!(rest.len(), 3);
        let indices: Vec<usize> = rest
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress(p) => Some(p.index),
                StreamEvent::Done(_) => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 2]);
        assert_matches!(
            rest.last(),
            Some(StreamEvent::Done(d)) if d.status == JobStatus::Completed
                && d.completed_count == 2
                && d.failed_count == 1
                && d.total_ms == Some(42)
        );
    }

    #[tokio::test]
    async fn late_subscriber_replays_everything() {
        let store = Arc::new(JobStore::new());
        let job = running_job(&store, 2).await;
        settle(&store, job.id(), 0, false).await;
        settle(&store, job.id(), 1, false).await;
        store.modify(job.id(), |j| j.finish(10, Some(5))).await.unwrap();

        let events: Vec<StreamEvent> = ProgressSubscription::new(store, job.id())
            .with_poll_interval(FAST)
            .into_stream()
            .collect()
            .await;
        assert_eq!(events.len(), 3);
        assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);
        assert_matches!(events.last(), Some(StreamEvent::Done(d)) if d.status == JobStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_job_ends_without_done() {
        let store = Arc::new(JobStore::new());
        let mut sub = ProgressSubscription::new(store, "missing").with_poll_interval(FAST);
        assert!(sub.next().await.is_none());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn snapshot_and_metrics_read_the_store() {
        let store = Arc::new(JobStore::new());
        let job = running_job(&store, 5).await;
        settle(&store, job.id(), 0, true).await;

        let snap = snapshot(&store, job.id()).await.unwrap();
        assert_eq!(snap.progress.completed, 1);
        assert_eq!(snap.progress.running, 4);

        let m = metrics(&store, job.id()).await.unwrap();
        assert_eq!(m.total_count, 5);
        assert_eq!(m.ttfi_ms, None);

        assert_matches!(
            snapshot(&store, "missing").await,
            Err(CoreError::NotFound { .. })
        );
    }
}
