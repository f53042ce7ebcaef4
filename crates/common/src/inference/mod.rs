//! Text generation abstraction
//!
//! The analysis lifecycle sends one prompt per analysis and gets free text
//! back. Providers:
//! - Hugging Face Inference API (text-generation task)
//! - Scripted mock for tests and offline runs

use crate::config::InferenceConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const DEFAULT_HF_BASE: &str = "https://api-inference.huggingface.co";

/// Trait for text generation
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Model identifier recorded on each analysis
    fn model_name(&self) -> &str;
}

/// Hugging Face Inference API client
pub struct HuggingFaceClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_new_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

impl HuggingFaceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_HF_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }
}

/// 5xx and 429 may clear up; other non-2xx statuses will not
fn status_is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl InferenceClient for HuggingFaceClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
                temperature: self.temperature,
                return_full_text: false,
            },
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| AppError::Inference {
            message: format!("Request failed: {}", e),
            retryable: e.is_timeout() || e.is_connect(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Inference {
                message: format!("API error {}: {}", status, body),
                retryable: status_is_retryable(status),
            });
        }

        let generations: Vec<GeneratedText> =
            response.json().await.map_err(|e| AppError::Inference {
                message: format!("Failed to parse response: {}", e),
                retryable: false,
            })?;

        let text = generations
            .into_iter()
            .next()
            .map(|g| g.generated_text.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AppError::Inference {
                message: "Empty generation".to_string(),
                retryable: false,
            });
        }

        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// One scripted step of [`MockInference`]
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail { message: String, retryable: bool },
    /// Sleep before answering; lets tests trip the caller's timeout
    Delay(Duration, String),
}

/// Scripted generator
///
/// Replies are consumed in order; once the script runs out the fallback
/// text is returned for every call.
pub struct MockInference {
    model: String,
    script: Mutex<VecDeque<MockReply>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl MockInference {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            model: "mock-generator".to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(fallback: impl Into<String>, replies: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from(replies)),
            ..Self::new(fallback)
        }
    }

    pub async fn push(&self, reply: MockReply) {
        self.script.lock().await.push_back(reply);
    }

    /// Prompts received so far
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl InferenceClient for MockInference {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().await.push(prompt.to_string());
        let next = self.script.lock().await.pop_front();

        match next {
            None => Ok(self.fallback.clone()),
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail { message, retryable }) => {
                Err(AppError::Inference { message, retryable })
            }
            Some(MockReply::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the configured inference client
pub fn create_inference_client(config: &InferenceConfig) -> Result<Arc<dyn InferenceClient>> {
    match config.provider.as_str() {
        "huggingface" => {
            if config.api_key.is_none() {
                tracing::warn!("No inference API key configured; requests are unauthenticated");
            }
            Ok(Arc::new(HuggingFaceClient::new(config)?))
        }
        "mock" => Ok(Arc::new(MockInference::new(
            "Finding: no acute abnormality described. Recommend routine follow-up.",
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown inference provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_script_then_fallback() {
        let mock = MockInference::with_script(
            "fallback",
            vec![
                MockReply::Text("first".into()),
                MockReply::Fail {
                    message: "boom".into(),
                    retryable: true,
                },
            ],
        );

        assert_eq!(mock.generate("p1").await.unwrap(), "first");
        let err = mock.generate("p2").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.generate("p3").await.unwrap(), "fallback");
        assert_eq!(mock.prompts().await, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(status_is_retryable(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(status_is_retryable(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!status_is_retryable(reqwest::StatusCode::BAD_REQUEST));
        assert!(!status_is_retryable(reqwest::StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = InferenceConfig {
            api_base: Some("http://localhost:8000/".into()),
            model: "org/model".into(),
            ..crate::config::AppConfig::default().inference
        };
        let client = HuggingFaceClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8000/models/org/model");
    }

    #[test]
    fn test_unknown_provider() {
        let config = InferenceConfig {
            provider: "nope".into(),
            ..crate::config::AppConfig::default().inference
        };
        assert!(create_inference_client(&config).is_err());
    }
}
