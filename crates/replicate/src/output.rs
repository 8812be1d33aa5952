//! Extracting an image URL from a prediction's `output` field.
//!
//! Models disagree on output shape: some return a bare URL, some a list of
//! URLs, some an object. The shape is parsed into [`PredictionOutput`] and
//! only http(s) URLs are accepted. For objects only the keys in
//! [`OUTPUT_URL_KEYS`] are consulted, in order.

use serde::Deserialize;

/// Object keys that may hold the image URL, in priority order.
pub const OUTPUT_URL_KEYS: &[&str] = &["url", "image", "output", "result"];

/// The accepted shapes of prediction output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutput {
    Single(String),
    List(Vec<serde_json::Value>),
    Keyed(serde_json::Map<String, serde_json::Value>),
}

/// Outcome of looking for an image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlExtraction {
    Found(String),
    NotFound,
}

impl PredictionOutput {
    /// Parse a raw output value. Numbers, booleans and null are not accepted.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// The first acceptable image URL.
    ///
    /// For lists only the first element is considered.
    pub fn image_url(&self) -> UrlExtraction {
        let candidate = match self {
            Self::Single(s) => Some(s.as_str()),
            Self::List(items) => items.first().and_then(|v| v.as_str()),
            Self::Keyed(map) => OUTPUT_URL_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|v| v.as_str().filter(|s| is_http_url(s))),
        };

        match candidate {
            Some(url) if is_http_url(url) => UrlExtraction::Found(url.to_string()),
            _ => UrlExtraction::NotFound,
        }
    }
}

/// Extract an image URL from an optional raw output value.
pub fn extract_image_url(output: Option<&serde_json::Value>) -> UrlExtraction {
    output
        .and_then(PredictionOutput::parse)
        .map(|parsed| parsed.image_url())
        .unwrap_or(UrlExtraction::NotFound)
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}
