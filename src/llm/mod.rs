pub mod providers;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// LLM provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LLMProvider {
    /// Any OpenAI-compatible `/chat/completions` endpoint
    OpenAI,
    /// Google Gemini `generateContent`
    Gemini,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl LLMConfig {
    /// Chat-completion settings used for course summaries
    pub fn summaries() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            endpoint: Some("https://api.openai.com/v1/chat/completions".to_string()),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 500,
            temperature: 0.5,
            timeout_seconds: 60,
        }
    }

    /// Generative settings used for mind-map structuring and rendering
    pub fn mindmap() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            endpoint: Some("https://generativelanguage.googleapis.com/v1beta".to_string()),
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            max_tokens: 8192,
            temperature: 0.2,
            timeout_seconds: 120,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self::summaries()
    }
}

/// Chat message for LLM communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Error types for LLM calls
#[derive(thiserror::Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider:?} API error {status}: {body}")]
    Api {
        provider: LLMProvider,
        status: u16,
        body: String,
    },

    #[error("No response content from {0:?}")]
    EmptyResponse(LLMProvider),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Trait for LLM providers
#[async_trait]
pub trait LLM: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse, LLMError>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> LLMProvider;

    /// Single-prompt generation, the `generateContent(prompt)` shape
    async fn generate(&self, prompt: &str) -> Result<String, LLMError> {
        let response = self.chat(vec![ChatMessage::user(prompt)]).await?;
        Ok(response.content)
    }
}

/// Create LLM instance based on configuration
pub fn create_llm(config: &LLMConfig) -> Result<Box<dyn LLM>, LLMError> {
    match config.provider {
        LLMProvider::OpenAI => Ok(Box::new(providers::OpenAIProvider::new(config.clone())?)),
        LLMProvider::Gemini => Ok(Box::new(providers::GeminiProvider::new(config.clone())?)),
    }
}
