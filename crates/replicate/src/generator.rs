//! [`GenerationPort`] backed by Replicate.

use async_trait::async_trait;
use pixelfan_core::generation::{GenerationPort, PollStatus, ProviderError};

use crate::api::{ModelRef, Prediction, PredictionStatus, ReplicateApi, ReplicateApiError};
use crate::output::{extract_image_url, UrlExtraction};

/// Placeholder substituted for the API token in surfaced error text.
const REDACTED: &str = "[REDACTED]";

/// Connection settings for Replicate.
#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    /// `owner/name` model reference, used when no version is pinned.
    pub model: String,
    /// Optional pinned version hash; takes precedence over `model`.
    pub model_version: Option<String>,
    pub base_url: String,
}

impl ReplicateConfig {
    pub fn model_ref(&self) -> ModelRef {
        match &self.model_version {
            Some(version) if !version.is_empty() => ModelRef::Version(version.clone()),
            _ => ModelRef::Model(self.model.clone()),
        }
    }
}

/// Image generation through Replicate predictions.
///
/// A missing API token is not an error at construction; every call fails
/// with [`ProviderError::NotConfigured`] instead, which the job engine
/// records as a failed slot.
pub struct ReplicateGenerator {
    config: ReplicateConfig,
    api: Option<ReplicateApi>,
}

impl ReplicateGenerator {
    pub fn new(config: ReplicateConfig) -> Result<Self, ReplicateApiError> {
        let api = if config.api_token.is_empty() {
            tracing::warn!("REPLICATE_API_TOKEN is empty; Replicate calls will fail");
            None
        } else {
            Some(ReplicateApi::new(
                config.base_url.clone(),
                config.api_token.clone(),
            )?)
        };
        Ok(Self { config, api })
    }

    fn api(&self) -> Result<&ReplicateApi, ProviderError> {
        self.api.as_ref().ok_or_else(|| {
            ProviderError::NotConfigured("REPLICATE_API_TOKEN environment variable is required".into())
        })
    }

    /// Convert an API error to a provider error with the token scrubbed.
    fn provider_error(&self, err: ReplicateApiError) -> ProviderError {
        ProviderError::Request(redact(&err.to_string(), &self.config.api_token))
    }
}

#[async_trait]
impl GenerationPort for ReplicateGenerator {
    async fn submit(&self, prompt: &str) -> Result<String, ProviderError> {
        let prediction = self
            .api()?
            .create_prediction(&self.config.model_ref(), prompt)
            .await
            .map_err(|e| self.provider_error(e))?;

        tracing::debug!(prediction_id = %prediction.id, "Replicate prediction created");
        Ok(prediction.id)
    }

    async fn poll(&self, prediction_id: &str) -> Result<PollStatus, ProviderError> {
        let prediction = self
            .api()?
            .get_prediction(prediction_id)
            .await
            .map_err(|e| self.provider_error(e))?;

        poll_status(&prediction)
    }
}

/// Map a prediction object onto the port's poll status.
pub fn poll_status(prediction: &Prediction) -> Result<PollStatus, ProviderError> {
    match prediction.status {
        PredictionStatus::Starting | PredictionStatus::Processing => Ok(PollStatus::InProgress),
        PredictionStatus::Succeeded => match extract_image_url(prediction.output.as_ref()) {
            UrlExtraction::Found(url) => Ok(PollStatus::Succeeded(url)),
            UrlExtraction::NotFound => Err(ProviderError::NoImageUrl),
        },
        PredictionStatus::Failed | PredictionStatus::Canceled => {
            let reason = match &prediction.error {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(v) if !v.is_null() => v.to_string(),
                _ => format!(
                    "Prediction failed with status: {}",
                    status_name(prediction.status)
                ),
            };
            Ok(PollStatus::Failed(reason))
        }
    }
}

fn status_name(status: PredictionStatus) -> &'static str {
    match status {
        PredictionStatus::Starting => "starting",
        PredictionStatus::Processing => "processing",
        PredictionStatus::Succeeded => "succeeded",
        PredictionStatus::Failed => "failed",
        PredictionStatus::Canceled => "canceled",
    }
}

fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        text.to_string()
    } else {
        text.replace(secret, REDACTED)
    }
}
