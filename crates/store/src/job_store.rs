use std::collections::HashMap;

use pixelfan_core::error::CoreError;
use pixelfan_core::job::Job;
use tokio::sync::Mutex;

/// In-memory job map behind one async mutex.
///
/// Every operation takes the same lock, so reads and writes are linearized
/// and no caller can observe a half-written aggregate. Callers receive
/// clones; the stored aggregate is only changed through [`JobStore::update`]
/// or [`JobStore::modify`].
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job. Fails with `Conflict` if the id is already taken.
    pub async fn create(&self, job: Job) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job.id()) {
            return Err(CoreError::Conflict(format!(
                "Job with id {} already exists",
                job.id()
            )));
        }
        jobs.insert(job.id().to_string(), job.clone());
        tracing::debug!(job_id = %job.id(), num_images = job.num_images(), "Job stored");
        Ok(job)
    }

    /// Snapshot of the current aggregate.
    pub async fn get(&self, job_id: &str) -> Result<Job, CoreError> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| not_found(job_id))
    }

    /// Replace the stored aggregate wholesale.
    pub async fn update(&self, job: Job) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.lock().await;
        let slot = jobs.get_mut(job.id()).ok_or_else(|| not_found(job.id()))?;
        *slot = job.clone();
        Ok(job)
    }

    /// Read-modify-write inside the critical section.
    ///
    /// `f` runs against the stored aggregate while the lock is held and must
    /// not block. If `f` returns an error the aggregate is left as it was.
    pub async fn modify<T, F>(&self, job_id: &str, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Job) -> Result<T, CoreError>,
    {
        let mut jobs = self.jobs.lock().await;
        let stored = jobs.get_mut(job_id).ok_or_else(|| not_found(job_id))?;
        let mut draft = stored.clone();
        let out = f(&mut draft)?;
        *stored = draft;
        Ok(out)
    }

    /// Number of retained jobs.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

fn not_found(job_id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Job",
        id: job_id.to_string(),
    }
}
