//! Client for the external image classifier.
//!
//! The classifier fetches a frame from the device itself; the gateway only
//! sends the device address and receives the top label back.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`ClassifierClient::classify`].
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("classifier returned status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Serialize)]
struct InferRequest<'a> {
    ip_address: &'a str,
}

/// The classifier's top prediction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    pub top_label: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Maps a classifier label to the species callback it should trigger.
///
/// Several labels may alias the same species.
pub fn species_callback(label: &str) -> Option<&'static str> {
    match label {
        "fox" => Some("fox_callback"),
        "bear" => Some("bear_callback"),
        "wolf" | "timber_wolf" => Some("wolf_callback"),
        "crocodile" => Some("crocodile_callback"),
        "deer" => Some("deer_callback"),
        _ => None,
    }
}

/// HTTP client for the classifier's `/infer` endpoint.
#[derive(Debug, Clone)]
pub struct ClassifierClient {
    http: reqwest::Client,
    infer_url: String,
}

impl ClassifierClient {
    /// Creates a client for the classifier at `base_url`, bounding every
    /// request by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            infer_url: format!("{}/infer", base_url.trim_end_matches('/')),
        }
    }

    /// Asks the classifier to label the current frame of the device at `address`.
    pub async fn classify(&self, address: &str) -> Result<Classification, ClassifierError> {
        let resp = self
            .http
            .post(&self.infer_url)
            .json(&InferRequest {
                ip_address: address,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ClassifierError::Status(resp.status()));
        }

        Ok(resp.json().await?)
    }
}
