// src/analysis/service.rs - External analysis service contract and the Gemini client
use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Failures the worker pool distinguishes when calling the service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A text-generation service that turns an evidence prompt into free-form output
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Client for the `generateContent` endpoint
pub struct GeminiService {
    client: Client,
    endpoint: String,
}

impl GeminiService {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AnalysisService for GeminiService {
    async fn generate(&self, api_key: &str, model: &str, prompt: &str) -> Result<String, ServiceError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.endpoint, model);
        debug!("POST {} ({} prompt chars)", url, prompt.len());

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.2 }
        });

        let response = self.client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout
                } else {
                    ServiceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_failure(status, text));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| ServiceError::Transport(format!("unreadable response: {}", e)))?;

        let output: String = parsed.candidates.into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if output.trim().is_empty() {
            return Err(ServiceError::Http { status: status.as_u16(), body: "empty candidate".to_string() });
        }

        Ok(output)
    }
}

/// Map a non-success response onto the pool's failure classes
pub fn classify_failure(status: StatusCode, body: String) -> ServiceError {
    let lower = body.to_ascii_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        return ServiceError::RateLimited(body);
    }

    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return ServiceError::PayloadTooLarge(body);
    }

    let size_hint = ["too large", "too long", "exceeds", "token count", "token limit", "maximum number of tokens"]
        .iter()
        .any(|hint| lower.contains(hint));
    if status == StatusCode::BAD_REQUEST && size_hint {
        return ServiceError::PayloadTooLarge(body);
    }

    ServiceError::Http { status: status.as_u16(), body }
}
