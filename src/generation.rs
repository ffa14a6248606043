//! Text-generation service access
//!
//! The pipeline only needs `generate(prompt, params) -> text`. The HTTP
//! implementation speaks the Anthropic messages API; tests substitute a
//! scripted implementation.

use crate::config::GenerationConfig;
use crate::error::TransportError;
use crate::prompts::Prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling parameters sent with every call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce raw text for a prompt
    async fn generate(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String, TransportError>;
}

/// HTTP client for the generation service
pub struct HttpGenerationClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, prompt: &Prompt, params: &GenerationParams) -> Result<String, TransportError> {
        if self.api_key.is_empty() {
            return Err(TransportError::Authentication(
                "ADVISOR_API_KEY not set. Generation requires API access.".to_string(),
            ));
        }

        let request_body = serde_json::json!({
            "model": params.model,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "system": prompt.system,
            "messages": [
                {
                    "role": "user",
                    "content": prompt.user
                }
            ]
        });

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        let json: serde_json::Value = response.json().await?;

        json["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .map(str::to_string)
            .ok_or_else(|| TransportError::Unexpected("response has no text content".to_string()))
    }
}
