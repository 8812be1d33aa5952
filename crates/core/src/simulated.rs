//! In-process provider that fakes image generation.
//!
//! Each submitted prediction finishes after a random delay and fails with a
//! configurable probability. Used when no real provider is configured and
//! for local development.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::Instant;

use crate::generation::{GenerationPort, PollStatus, ProviderError};
use crate::types::new_id;

/// Error text recorded for a simulated failure.
pub const SIMULATED_FAILURE: &str = "Simulated generation failure";

/// Tunables for [`SimulatedGenerator`].
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Shortest time a prediction takes.
    pub min_delay: Duration,
    /// Longest time a prediction takes (exclusive).
    pub max_delay: Duration,
    /// Probability in `0.0..=1.0` that a prediction fails.
    pub failure_rate: f64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            failure_rate: 0.1,
        }
    }
}

struct Prediction {
    ready_at: Instant,
    succeeds: bool,
}

/// A [`GenerationPort`] that never leaves the process.
pub struct SimulatedGenerator {
    config: SimulatedConfig,
    predictions: Mutex<HashMap<String, Prediction>>,
}

impl SimulatedGenerator {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            predictions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of predictions submitted but not yet observed as terminal.
    pub fn pending_count(&self) -> usize {
        self.predictions.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn draw(&self) -> (Duration, bool) {
        let mut rng = rand::rng();
        let delay = if self.config.max_delay > self.config.min_delay {
            rng.random_range(self.config.min_delay..self.config.max_delay)
        } else {
            self.config.min_delay
        };
        let succeeds = !rng.random_bool(self.config.failure_rate.clamp(0.0, 1.0));
        (delay, succeeds)
    }
}

impl Default for SimulatedGenerator {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

#[async_trait]
impl GenerationPort for SimulatedGenerator {
    async fn submit(&self, _prompt: &str) -> Result<String, ProviderError> {
        let (delay, succeeds) = self.draw();
        let prediction_id = new_id();

        let mut predictions = self
            .predictions
            .lock()
            .map_err(|_| ProviderError::Request("simulated provider state poisoned".into()))?;
        predictions.insert(
            prediction_id.clone(),
            Prediction {
                ready_at: Instant::now() + delay,
                succeeds,
            },
        );
        Ok(prediction_id)
    }

    async fn poll(&self, prediction_id: &str) -> Result<PollStatus, ProviderError> {
        let mut predictions = self
            .predictions
            .lock()
            .map_err(|_| ProviderError::Request("simulated provider state poisoned".into()))?;

        let ready = match predictions.get(prediction_id) {
            Some(prediction) => Instant::now() >= prediction.ready_at,
            None => {
                return Err(ProviderError::Request(format!(
                    "Unknown prediction '{prediction_id}'"
                )))
            }
        };
        if !ready {
            return Ok(PollStatus::InProgress);
        }

        let prediction = predictions.remove(prediction_id);
        Ok(match prediction {
            Some(p) if p.succeeds => {
                PollStatus::Succeeded(format!("https://example.com/images/{prediction_id}.jpg"))
            }
            _ => PollStatus::Failed(SIMULATED_FAILURE.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{generate_image, PollSchedule};

    fn instant(failure_rate: f64) -> SimulatedGenerator {
        SimulatedGenerator::new(SimulatedConfig {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            failure_rate,
        })
    }

    fn quick_schedule() -> PollSchedule {
        PollSchedule {
            fast_interval: Duration::from_millis(1),
            max_wait: Duration::from_secs(1),
            ..PollSchedule::default()
        }
    }

    #[tokio::test]
    async fn always_succeeds_with_zero_failure_rate() {
        let generator = instant(0.0);
        let url = generate_image(&generator, "a cat", &quick_schedule())
            .await
            .unwrap();
        assert!(url.starts_with("https://example.com/images/"));
        assert_eq!(generator.pending_count(), 0);
    }

    #[tokio::test]
    async fn always_fails_with_full_failure_rate() {
        let generator = instant(1.0);
        let result = generate_image(&generator, "a cat", &quick_schedule()).await;
        assert_eq!(
            result,
            Err(ProviderError::Rejected(SIMULATED_FAILURE.to_string()))
        );
    }

    #[tokio::test]
    async fn reports_in_progress_until_ready() {
        let generator = SimulatedGenerator::new(SimulatedConfig {
            min_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(61),
            failure_rate: 0.0,
        });
        let id = generator.submit("a cat").await.unwrap();
        assert_eq!(generator.poll(&id).await.unwrap(), PollStatus::InProgress);
        assert_eq!(generator.pending_count(), 1);
    }

    #[tokio::test]
    async fn unknown_prediction_is_an_error() {
        let generator = instant(0.0);
        assert!(generator.poll("missing").await.is_err());
    }
}
