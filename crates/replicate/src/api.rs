//! REST client for the Replicate predictions endpoints.
//!
//! Wraps `POST /predictions` and `GET /predictions/{id}` using [`reqwest`].

use std::time::Duration;

use serde::Deserialize;

/// Default Replicate API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Whole-request timeout for a single API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// TCP connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle status reported by Replicate for a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// The subset of a Replicate prediction object we consume.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Errors from the Replicate REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateApiError {
    /// The HTTP request itself failed (network, DNS, TLS, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Replicate returned a non-2xx status code.
    #[error("Replicate API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

/// Which model a prediction runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// A pinned model version hash.
    Version(String),
    /// An `owner/name` model reference (latest version).
    Model(String),
}

/// HTTP client for the Replicate API.
pub struct ReplicateApi {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl ReplicateApi {
    /// Create a client with the default timeouts.
    pub fn new(base_url: String, api_token: String) -> Result<Self, ReplicateApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    /// Create a prediction for `prompt` against `model`.
    pub async fn create_prediction(
        &self,
        model: &ModelRef,
        prompt: &str,
    ) -> Result<Prediction, ReplicateApiError> {
        let body = prediction_body(model, prompt);

        let response = self
            .client
            .post(format!("{}/predictions", self.base_url))
            .header("Authorization", format!("Token {}", self.api_token))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch the current state of a prediction.
    pub async fn get_prediction(&self, prediction_id: &str) -> Result<Prediction, ReplicateApiError> {
        let response = self
            .client
            .get(format!("{}/predictions/{}", self.base_url, prediction_id))
            .header("Authorization", format!("Token {}", self.api_token))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ReplicateApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ReplicateApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ReplicateApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Request body for `POST /predictions`.
pub fn prediction_body(model: &ModelRef, prompt: &str) -> serde_json::Value {
    let input = serde_json::json!({ "prompt": prompt });
    match model {
        ModelRef::Version(version) => serde_json::json!({ "version": version, "input": input }),
        ModelRef::Model(model) => serde_json::json!({ "model": model, "input": input }),
    }
}
