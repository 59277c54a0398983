use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod client;
pub mod json;
pub mod prompts;
mod service;

pub use client::{LlmConfig, OpenAiChatModel};
pub use service::{AdvisorService, LlmAdvisor, Task};

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("language model is not configured")]
    NotConfigured,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned an empty completion")]
    EmptyCompletion,
    #[error("could not parse model output: {0}")]
    Parse(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

/// Anything that turns a conversation into one completion string.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> AdvisorResult<String>;

    fn model_name(&self) -> &str {
        "unknown"
    }
}
