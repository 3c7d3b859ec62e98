//! Remote embeddings via the Gemini `embedContent` API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::EmbedError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Embedding provider backed by the Gemini API.
///
/// Input longer than the configured character limit is truncated at a
/// character boundary before the request is built; callers always pass
/// the full text.
///
/// Retry strategy:
/// - HTTP 429, or an error body mentioning quota exhaustion → [`EmbedError::Quota`],
///   no retry (the chain disables this provider)
/// - other 4xx → fail immediately
/// - 5xx or network error → retry with backoff of 1.5s × attempts so far
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_input_chars: usize,
    max_attempts: u32,
}

impl GeminiEmbedder {
    /// Create a provider from configuration and an API key.
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Gemini")?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            max_input_chars: config.max_input_chars,
            max_attempts: config.max_attempts,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let input = truncate_chars(text, self.max_input_chars);
        let url = format!("{}/{}:embedContent", GEMINI_API_BASE, self.model);
        let body = serde_json::json!({
            "model": self.model,
            "content": { "parts": [ { "text": input } ] },
        });

        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = Duration::from_millis(1500 * u64::from(attempt));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            EmbedError::Provider(format!("Invalid Gemini response: {e}"))
                        })?;
                        return parse_embedding(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    if is_quota_error(status, &body_text) {
                        return Err(EmbedError::Quota(format!(
                            "Gemini API error {status}: {body_text}"
                        )));
                    }

                    if status.is_server_error() {
                        last_err = Some(EmbedError::Provider(format!(
                            "Gemini API error {status}: {body_text}"
                        )));
                        continue;
                    }

                    // Client error, not quota: retrying will not help.
                    return Err(EmbedError::Provider(format!(
                        "Gemini API error {status}: {body_text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(EmbedError::Provider(format!("Gemini request failed: {e}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EmbedError::Provider("Gemini embedding failed after retries".into())))
    }
}

/// Quota exhaustion comes back either as a 429 status or as an error body
/// mentioning `quota` or `RESOURCE_EXHAUSTED`.
fn is_quota_error(status: StatusCode, body: &str) -> bool {
    if status.as_u16() == 429 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("quota") || lower.contains("resource_exhausted")
}

/// Extract `embedding.values` from a Gemini response.
fn parse_embedding(json: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    let values = json
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            EmbedError::Provider("Invalid Gemini response: missing embedding.values".into())
        })?;

    if values.is_empty() {
        return Err(EmbedError::Empty);
    }

    Ok(values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Truncate to at most `max_chars` characters without splitting a
/// multi-byte character.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
