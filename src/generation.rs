//! Answer generation backends.
//!
//! [`AnswerGenerator`] is implemented by [`GeminiGenerator`] for real
//! deployments and [`DisabledGenerator`] when no API key is configured.
//! A generation failure never takes a query down; the orchestrator
//! catches it and substitutes a fixed apology.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::config::GenerationConfig;
use crate::error::AssistantError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Produces an answer from a fully assembled prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AssistantError>;
}

/// Pick a generator from configuration. Falls back to
/// [`DisabledGenerator`] when `GEMINI_API_KEY` is not set.
pub fn build_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(Arc::new(GeminiGenerator::new(config, key)?)),
        _ => {
            info!("GEMINI_API_KEY not set, answers will be degraded");
            Ok(Arc::new(DisabledGenerator))
        }
    }
}

/// Generator used when no generation model is configured. Always fails,
/// which the orchestrator turns into the degraded answer.
pub struct DisabledGenerator;

#[async_trait]
impl AnswerGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, AssistantError> {
        Err(AssistantError::GenerationFailed(
            "No generation model configured: set GEMINI_API_KEY".into(),
        ))
    }
}

/// Generator backed by the Gemini `generateContent` API.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Gemini")?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AssistantError> {
        let url = format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model);
        let body = serde_json::json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ],
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::GenerationFailed(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(AssistantError::GenerationFailed(format!(
                "Gemini API error {status}: {body_text}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::GenerationFailed(format!("Invalid response: {e}")))?;

        extract_text(&json)
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a Gemini response.
fn extract_text(json: &serde_json::Value) -> Result<String, AssistantError> {
    json.get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AssistantError::GenerationFailed("Response missing candidate text".into())
        })
}
