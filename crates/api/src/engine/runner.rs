//! Job runner: drives a job from `pending` to a terminal state.
//!
//! Each job is split into one task per slot. Every slot task acquires a
//! permit from the pool shared by all jobs, then makes up to
//! `max_retries` generation attempts with jittered exponential backoff. The
//! permit is held across backoff sleeps, so at most `max_concurrency`
//! slots are ever generating or waiting to retry.
//!
//! Once every slot has settled the runner folds the results into the
//! job's single terminal transition. If the fold itself faults, the job is
//! marked failed with its recorded slot results preserved.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use pixelfan_core::error::CoreError;
use pixelfan_core::generation::{generate_image, jittered_backoff, GenerationPort, PollSchedule};
use pixelfan_core::job::{JobStatus, SlotOutcome};
use pixelfan_core::types::JobId;
use pixelfan_store::JobStore;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::config::ServerConfig;

/// Default size of the permit pool.
pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
/// Default attempt budget per slot.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff unit.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Tunables for [`JobRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Permits shared by every slot of every job.
    pub max_concurrency: usize,
    /// Attempts per slot, the first included.
    pub max_retries: u32,
    /// Base unit of the retry backoff.
    pub backoff_unit: Duration,
    /// Poll cadence for each submitted prediction.
    pub poll_schedule: PollSchedule,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            poll_schedule: PollSchedule::default(),
        }
    }
}

impl RunnerConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            max_retries: config.retry_attempts,
            ..Self::default()
        }
    }
}

/// Background executor for generation jobs.
///
/// Cloning is cheap; clones share the permit pool and the set of jobs
/// being driven.
#[derive(Clone)]
pub struct JobRunner {
    store: Arc<JobStore>,
    generator: Arc<dyn GenerationPort>,
    permits: Arc<Semaphore>,
    active: Arc<Mutex<HashSet<JobId>>>,
    config: Arc<RunnerConfig>,
}

impl JobRunner {
    pub fn new(
        store: Arc<JobStore>,
        generator: Arc<dyn GenerationPort>,
        mut config: RunnerConfig,
    ) -> Self {
        config.max_concurrency = config.max_concurrency.max(1);
        config.max_retries = config.max_retries.max(1);
        Self {
            store,
            generator,
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            active: Arc::new(Mutex::new(HashSet::new())),
            config: Arc::new(config),
        }
    }

    /// Begin driving `job_id` in the background.
    ///
    /// Returns `false` without doing anything if the job is already being
    /// driven. A job that has already left `pending` is skipped by the
    /// driving task itself. Must be called from within a Tokio runtime.
    pub fn start(&self, job_id: &str) -> bool {
        if !self.active().insert(job_id.to_string()) {
            tracing::debug!(job_id = %job_id, "Job already being driven");
            return false;
        }

        let runner = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let started = Instant::now();

            // Nested task: a panic in the drive surfaces as a JoinError and
            // deregistration below still runs.
            let drive = tokio::spawn({
                let runner = runner.clone();
                let job_id = job_id.clone();
                async move { runner.drive(&job_id, started).await }
            });

            match drive.await {
                Ok(Ok(Some(status))) => {
                    tracing::info!(
                        job_id = %job_id,
                        status = %status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Job finished",
                    );
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::error!(job_id = %job_id, error = %e, "Job roll-up failed");
                    runner.fail_defensively(&job_id, started).await;
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Job task panicked");
                    runner.fail_defensively(&job_id, started).await;
                }
            }

            runner.active().remove(&job_id);
        });
        true
    }

    /// Ids of the jobs currently being driven.
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.active().iter().cloned().collect()
    }

    /// Permits currently held by slot tasks.
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrency - self.permits.available_permits()
    }

    // ---- private helpers ----

    fn active(&self) -> MutexGuard<'_, HashSet<JobId>> {
        // The set is only touched by short non-panicking sections.
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run every slot of the job and fold the results.
    ///
    /// Returns `Ok(None)` when the job was not pending.
    async fn drive(&self, job_id: &str, started: Instant) -> Result<Option<JobStatus>, CoreError> {
        let job = self
            .store
            .modify(job_id, |job| {
                if job.status() != JobStatus::Pending {
                    return Ok(None);
                }
                job.start()?;
                Ok(Some(job.clone()))
            })
            .await?;

        let Some(job) = job else {
            tracing::debug!(job_id = %job_id, "Job is not pending, nothing to drive");
            return Ok(None);
        };

        tracing::info!(
            job_id = %job_id,
            num_images = job.num_images(),
            "Job started",
        );

        let prompt: Arc<str> = Arc::from(job.prompt());
        let slots = (0..job.results().len()).map(|index| {
            let runner = self.clone();
            let job_id = job_id.to_string();
            let prompt = Arc::clone(&prompt);
            tokio::spawn(async move { runner.run_slot(&job_id, index, &prompt, started).await })
        });

        let mut first_settled: Option<Duration> = None;
        for (index, joined) in join_all(slots).await.into_iter().enumerate() {
            let fault = match joined {
                Ok(Ok(settled_at)) => {
                    first_settled = Some(first_settled.map_or(settled_at, |f| f.min(settled_at)));
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("Slot task aborted: {e}"),
            };
            tracing::error!(job_id = %job_id, index, error = %fault, "Slot faulted");
            self.record_fault(job_id, index, fault).await;
        }

        let total_ms = started.elapsed().as_millis() as u64;
        let ttfi_ms = first_settled.map(|d| d.as_millis() as u64);
        let status = self
            .store
            .modify(job_id, |job| job.finish(total_ms, ttfi_ms))
            .await?;
        Ok(Some(status))
    }

    /// Generate one slot and record its outcome.
    ///
    /// Returns the time, relative to job start, at which the slot settled.
    async fn run_slot(
        &self,
        job_id: &str,
        index: usize,
        prompt: &str,
        started: Instant,
    ) -> Result<Duration, CoreError> {
        let outcome = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| CoreError::Internal("Generation permit pool closed".into()))?;
            self.attempt(job_id, index, prompt).await
        };
        let settled_at = started.elapsed();

        self.store
            .modify(job_id, |job| job.record_result(index, outcome))
            .await?;
        Ok(settled_at)
    }

    /// Attempt loop for one slot. Called with a permit held.
    async fn attempt(&self, job_id: &str, index: usize, prompt: &str) -> SlotOutcome {
        let max_attempts = self.config.max_retries;
        let mut attempt = 0;

        loop {
            let err = match generate_image(
                self.generator.as_ref(),
                prompt,
                &self.config.poll_schedule,
            )
            .await
            {
                Ok(url) => {
                    tracing::debug!(job_id = %job_id, index, attempt, "Slot generated");
                    return SlotOutcome::Succeeded { url };
                }
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= max_attempts {
                tracing::warn!(
                    job_id = %job_id,
                    index,
                    attempts = attempt,
                    error = %err,
                    "Slot failed after all attempts",
                );
                return SlotOutcome::Failed {
                    error: err.to_string(),
                };
            }

            let delay = jittered_backoff(attempt - 1, self.config.backoff_unit);
            tracing::warn!(
                job_id = %job_id,
                index,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Generation attempt failed, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Record a faulted slot as failed so the fold can still run.
    async fn record_fault(&self, job_id: &str, index: usize, error: String) {
        let result = self
            .store
            .modify(job_id, |job| {
                let settled = job.results().get(index).is_some_and(|r| r.is_settled());
                if settled {
                    return Ok(());
                }
                job.record_result(
                    index,
                    SlotOutcome::Failed {
                        error: format!("Internal error: {error}"),
                    },
                )
            })
            .await;
        if let Err(e) = result {
            tracing::error!(job_id = %job_id, index, error = %e, "Could not record slot fault");
        }
    }

    async fn fail_defensively(&self, job_id: &str, started: Instant) {
        let total_ms = started.elapsed().as_millis() as u64;
        match self
            .store
            .modify(job_id, |job| Ok(job.fail_defensively(total_ms)))
            .await
        {
            Ok(true) => tracing::warn!(job_id = %job_id, "Job marked failed after fault"),
            Ok(false) => {}
            Err(e) => tracing::error!(job_id = %job_id, error = %e, "Could not mark job failed"),
        }
    }
}
