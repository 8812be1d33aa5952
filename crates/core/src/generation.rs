//! The generation port: the narrow seam between the job engine and an
//! external image provider.
//!
//! A provider exposes two calls, [`GenerationPort::submit`] and
//! [`GenerationPort::poll`]. [`generate_image`] composes them into one
//! generation attempt: submit, then poll on a widening schedule until the
//! prediction is terminal or the wait budget runs out.
//!
//! Retry backoff between attempts is computed here too ([`backoff_delay`])
//! so the policy can be tested without a runtime.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

// ---------------------------------------------------------------------------
// Errors and statuses
// ---------------------------------------------------------------------------

/// Failure of a single generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Credentials or model settings are missing.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Transport or API-level failure talking to the provider.
    #[error("Provider request failed: {0}")]
    Request(String),

    /// The provider reported the prediction as failed or cancelled.
    #[error("Prediction failed: {0}")]
    Rejected(String),

    /// The prediction succeeded but carried no usable image URL.
    #[error("No valid image URL in prediction output")]
    NoImageUrl,

    /// The prediction did not reach a terminal state in time.
    #[error("Prediction timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),
}

/// Result of polling a submitted prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    InProgress,
    Succeeded(String),
    Failed(String),
}

/// An external image provider.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    /// Queue a prediction for `prompt`, returning the provider's id for it.
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Check on a previously submitted prediction.
    async fn poll(&self, prediction_id: &str) -> Result<PollStatus, ProviderError>;
}

// ---------------------------------------------------------------------------
// Poll schedule
// ---------------------------------------------------------------------------

/// Poll cadence for a submitted prediction.
///
/// Polls every `fast_interval` for the first `fast_window`, then every
/// `medium_interval` until `medium_window`, then every `slow_interval`.
/// Gives up once `max_wait` has elapsed.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    pub fast_interval: Duration,
    pub fast_window: Duration,
    pub medium_interval: Duration,
    pub medium_window: Duration,
    pub slow_interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_secs(1),
            fast_window: Duration::from_secs(30),
            medium_interval: Duration::from_secs(2),
            medium_window: Duration::from_secs(120),
            slow_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
        }
    }
}

impl PollSchedule {
    /// Delay before the next poll, given the time already spent waiting.
    pub fn delay_for(&self, elapsed: Duration) -> Duration {
        if elapsed < self.fast_window {
            self.fast_interval
        } else if elapsed < self.medium_window {
            self.medium_interval
        } else {
            self.slow_interval
        }
    }
}

/// Run one generation attempt: submit `prompt` and poll until terminal.
///
/// Returns the image URL on success. A failed or cancelled prediction maps
/// to [`ProviderError::Rejected`]; exceeding `max_wait` maps to
/// [`ProviderError::Timeout`].
pub async fn generate_image(
    port: &dyn GenerationPort,
    prompt: &str,
    schedule: &PollSchedule,
) -> Result<String, ProviderError> {
    let prediction_id = port.submit(prompt).await?;
    let started = tokio::time::Instant::now();

    loop {
        match port.poll(&prediction_id).await? {
            PollStatus::Succeeded(url) => return Ok(url),
            PollStatus::Failed(reason) => return Err(ProviderError::Rejected(reason)),
            PollStatus::InProgress => {}
        }

        let elapsed = started.elapsed();
        if elapsed >= schedule.max_wait {
            tracing::warn!(
                prediction_id = %prediction_id,
                waited_ms = elapsed.as_millis() as u64,
                "Prediction did not finish in time",
            );
            return Err(ProviderError::Timeout(schedule.max_wait));
        }
        tokio::time::sleep(schedule.delay_for(elapsed)).await;
    }
}

// ---------------------------------------------------------------------------
// Retry backoff
// ---------------------------------------------------------------------------

/// Lower bound of the random jitter added to each backoff, in units.
pub const BACKOFF_JITTER_MIN: f64 = 0.1;
/// Upper bound (exclusive) of the random jitter, in units.
pub const BACKOFF_JITTER_MAX: f64 = 0.3;

/// Largest exponent applied, so very high attempt counts cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Backoff after `attempt` failed attempts: `(2^attempt + jitter) * unit`.
pub fn backoff_delay(attempt: u32, unit: Duration, jitter: f64) -> Duration {
    let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
    unit.mul_f64(2f64.powi(exponent as i32) + jitter)
}

/// [`backoff_delay`] with jitter drawn uniformly from
/// `[BACKOFF_JITTER_MIN, BACKOFF_JITTER_MAX)`.
pub fn jittered_backoff(attempt: u32, unit: Duration) -> Duration {
    let jitter = rand::rng().random_range(BACKOFF_JITTER_MIN..BACKOFF_JITTER_MAX);
    backoff_delay(attempt, unit, jitter)
}
