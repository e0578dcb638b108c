//! Client for the vision-inference service.
//!
//! Speaks the Ollama `/api/generate` protocol: one JSON request carrying the
//! model, the prompt and a base64 JPEG, answered by a JSON object whose
//! `response` field holds the generated text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::AnalysisConfig;

/// Longest slice of an error body copied into the analysis error message.
const MAX_ERROR_BODY: usize = 200;

/// Something that can describe a JPEG image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Return the raw (uncleaned) model answer for `jpeg`.
    async fn describe(&self, jpeg: Bytes) -> Result<String, InferenceError>;
}

#[async_trait]
impl<T: VisionModel + ?Sized> VisionModel for Arc<T> {
    async fn describe(&self, jpeg: Bytes) -> Result<String, InferenceError> {
        (**self).describe(jpeg).await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [String; 1],
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP client for an Ollama-compatible generate endpoint.
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    prompt: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &AnalysisConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| InferenceError::Other(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            prompt: config.prompt.clone(),
            timeout: config.request_timeout(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn classify(&self, err: reqwest::Error) -> InferenceError {
        if err.is_timeout() {
            InferenceError::Timeout(self.timeout)
        } else if err.is_connect() {
            InferenceError::ConnectionUnavailable(self.endpoint.clone())
        } else if err.is_decode() {
            InferenceError::Other(format!("Malformed response from inference service: {err}"))
        } else {
            InferenceError::Other(format!("Inference request failed: {err}"))
        }
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn describe(&self, jpeg: Bytes) -> Result<String, InferenceError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: &self.prompt,
            images: [STANDARD.encode(&jpeg)],
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.trim().chars().take(MAX_ERROR_BODY).collect();
            return Err(InferenceError::Other(format!(
                "Inference service returned {status}: {text}"
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| self.classify(e))?;
        Ok(parsed.response)
    }
}
