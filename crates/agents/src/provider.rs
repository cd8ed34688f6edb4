//! Model invocation boundary.
//!
//! The orchestration core treats the provider as opaque: it hands over a
//! fully assembled request and only needs content, tool calls, token usage
//! and a stop reason back. HTTP transport, streaming and retries live behind
//! the `ModelClient` implementation.

use async_trait::async_trait;
use crew_core::{ModelRef, SamplingParams, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkerError;
use crate::tool::ToolSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Set on `Tool` messages: which call this responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on `Assistant` messages that request tool execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Other,
}

/// Everything one round trip needs, assembled by the worker.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: ModelRef,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    pub sampling: SamplingParams,
    pub api_key: String,
}

/// Terminal message of one round trip.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    /// A plain final-text response with no tool calls.
    pub fn text(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            usage,
            stop_reason: StopReason::EndTurn,
        }
    }
}

/// Opaque model-provider boundary.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, WorkerError>;
}

/// Credential lookup boundary.
pub trait ApiKeyProvider: Send + Sync {
    fn api_key(&self, provider: &str) -> Result<String, WorkerError>;
}

/// Resolves `{PROVIDER}_API_KEY` from the environment, uppercasing the
/// provider id and mapping `-` to `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvKeyProvider;

impl ApiKeyProvider for EnvKeyProvider {
    fn api_key(&self, provider: &str) -> Result<String, WorkerError> {
        let var = format!("{}_API_KEY", provider.to_uppercase().replace('-', "_"));
        std::env::var(&var)
            .map_err(|_| WorkerError::Credentials(format!("environment variable {var} is not set")))
    }
}
