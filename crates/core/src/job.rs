//! The job aggregate and its state machine.
//!
//! A [`Job`] owns one [`ImageResult`] per requested image. The result vector
//! is sized at construction and never grows or shrinks; every later change
//! goes through the transition methods below so the lifecycle rules hold no
//! matter who calls them:
//!
//! ```text
//! pending -> running -> completed | failed
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;
use crate::types::{new_id, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Minimum prompt length after trimming whitespace.
pub const MIN_PROMPT_CHARS: usize = 3;
/// Smallest number of images a single job may request.
pub const MIN_IMAGES: u32 = 5;
/// Largest number of images a single job may request.
pub const MAX_IMAGES: u32 = 20;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle status of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single image slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Running,
    Completed,
    Failed,
}

impl ResultStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ImageResult
// ---------------------------------------------------------------------------

/// One slot of a job. `url` is set iff completed, `error` iff failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    pub id: String,
    pub status: ResultStatus,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl ImageResult {
    fn running() -> Self {
        Self {
            id: new_id(),
            status: ResultStatus::Running,
            url: None,
            error: None,
        }
    }

    /// Whether the slot has left `running`.
    pub fn is_settled(&self) -> bool {
        self.status != ResultStatus::Running
    }
}

/// Terminal outcome of one slot, as written back by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Succeeded { url: String },
    Failed { error: String },
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// The job aggregate.
///
/// Fields are private: the result vector length is fixed at creation and the
/// status only moves forward through [`Job::start`], [`Job::finish`] and
/// [`Job::fail_defensively`].
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    id: JobId,
    prompt: String,
    num_images: u32,
    status: JobStatus,
    created_at: Timestamp,
    results: Vec<ImageResult>,
    total_ms: Option<u64>,
    ttfi_ms: Option<u64>,
}

impl Job {
    /// Create a pending job with `num_images` running result slots.
    pub fn new(prompt: impl Into<String>, num_images: u32) -> Self {
        Self {
            id: new_id(),
            prompt: prompt.into(),
            num_images,
            status: JobStatus::Pending,
            created_at: chrono::Utc::now(),
            results: (0..num_images).map(|_| ImageResult::running()).collect(),
            total_ms: None,
            ttfi_ms: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn num_images(&self) -> u32 {
        self.num_images
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn results(&self) -> &[ImageResult] {
        &self.results
    }

    pub fn total_ms(&self) -> Option<u64> {
        self.total_ms
    }

    pub fn ttfi_ms(&self) -> Option<u64> {
        self.ttfi_ms
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether every slot has left `running`.
    pub fn all_settled(&self) -> bool {
        self.results.iter().all(ImageResult::is_settled)
    }

    /// `pending -> running`.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.status != JobStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot start from status '{}'",
                self.id, self.status
            )));
        }
        self.status = JobStatus::Running;
        Ok(())
    }

    /// Record the terminal outcome of slot `index`.
    ///
    /// A slot is written exactly once, and only while the job is running.
    pub fn record_result(&mut self, index: usize, outcome: SlotOutcome) -> Result<(), CoreError> {
        if self.status != JobStatus::Running {
            return Err(CoreError::Conflict(format!(
                "Job {} is '{}', results can only be recorded while running",
                self.id, self.status
            )));
        }
        let len = self.results.len();
        let slot = self.results.get_mut(index).ok_or_else(|| {
            CoreError::Conflict(format!("Slot index {index} out of range (len {len})"))
        })?;
        if slot.is_settled() {
            return Err(CoreError::Conflict(format!(
                "Slot {index} of job {} already settled as '{}'",
                self.id, slot.status
            )));
        }

        match outcome {
            SlotOutcome::Succeeded { url } => {
                slot.status = ResultStatus::Completed;
                slot.url = Some(url);
                slot.error = None;
            }
            SlotOutcome::Failed { error } => {
                slot.status = ResultStatus::Failed;
                slot.url = None;
                slot.error = Some(error);
            }
        }
        Ok(())
    }

    /// The single terminal transition once every slot has settled.
    ///
    /// The job fails iff every slot failed; partial success counts as
    /// completed. Returns the terminal status.
    pub fn finish(&mut self, total_ms: u64, ttfi_ms: Option<u64>) -> Result<JobStatus, CoreError> {
        if self.status != JobStatus::Running {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot finish from status '{}'",
                self.id, self.status
            )));
        }
        if !self.all_settled() {
            return Err(CoreError::Conflict(format!(
                "Job {} still has running slots",
                self.id
            )));
        }

        let all_failed = self
            .results
            .iter()
            .all(|r| r.status == ResultStatus::Failed);
        self.status = if all_failed {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        self.total_ms = Some(total_ms);
        self.ttfi_ms = ttfi_ms;
        Ok(self.status)
    }

    /// Mark the job failed after the roll-up itself faulted.
    ///
    /// Slot results already recorded are left untouched. Returns `false`
    /// when the job had already reached a terminal state.
    pub fn fail_defensively(&mut self, total_ms: u64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.total_ms.get_or_insert(total_ms);
        true
    }
}

// ---------------------------------------------------------------------------
// Generate request
// ---------------------------------------------------------------------------

/// Request body for `POST /api/generate`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(custom(function = "validate_prompt"))]
    pub prompt: String,
    #[validate(range(min = MIN_IMAGES, max = MAX_IMAGES))]
    pub num_images: u32,
}

/// A request that passed validation, with the prompt trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub prompt: String,
    pub num_images: u32,
}

impl GenerateRequest {
    /// Validate the request and normalise the prompt.
    pub fn into_validated(self) -> Result<ValidatedRequest, CoreError> {
        self.validate().map_err(|errors| {
            let mut messages: Vec<String> = errors
                .field_errors()
                .iter()
                .flat_map(|(field, errs)| {
                    errs.iter().map(move |e| match &e.message {
                        Some(msg) => msg.to_string(),
                        None if e.code == "range" => format!(
                            "Number of images must be between {MIN_IMAGES} and {MAX_IMAGES}"
                        ),
                        None => format!("Invalid {field}"),
                    })
                })
                .collect();
            messages.sort();
            CoreError::Validation(messages.join("; "))
        })?;

        Ok(ValidatedRequest {
            prompt: self.prompt.trim().to_string(),
            num_images: self.num_images,
        })
    }
}

fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().chars().count() < MIN_PROMPT_CHARS {
        return Err(ValidationError::new("prompt_too_short").with_message(Cow::Owned(
            format!("Prompt must be at least {MIN_PROMPT_CHARS} characters long"),
        )));
    }
    Ok(())
}
