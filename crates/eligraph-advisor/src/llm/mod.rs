//! Language-model collaborator interface
//!
//! The consultant turns eligibility results into free-text guidance. Everything
//! model-specific sits behind [`LLMProvider`], so tests (and other vendors) can
//! plug in without touching prompt composition.

#[cfg(feature = "openai")]
pub mod providers;

use async_trait::async_trait;
use eligraph_storage::EligibilityMatch;
use serde::{Deserialize, Serialize};

// ============================================================================
// LLM Provider Interface
// ============================================================================

/// Trait for LLM API providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError>;

    /// Get model info
    fn model_info(&self) -> ModelInfo;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub max_tokens: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(String),
}

// ============================================================================
// Response Generation
// ============================================================================

/// The collaborator could not produce an answer.
///
/// Surfaced to end users as an apology string, never as a crash.
#[derive(Debug, thiserror::Error)]
#[error("AI service unavailable: {reason}")]
pub struct ServiceUnavailableError {
    pub reason: String,
}

impl From<LLMError> for ServiceUnavailableError {
    fn from(err: LLMError) -> Self {
        Self {
            reason: err.to_string(),
        }
    }
}

/// Produces advice for a student query given its eligibility results.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate_response(
        &self,
        system_prompt: &str,
        user_query: &str,
        eligibility: &[EligibilityMatch],
    ) -> Result<String, ServiceUnavailableError>;
}
