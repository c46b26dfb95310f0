//! OpenAI-compatible chat completion types.

use serde::{Deserialize, Serialize};

use crate::sampling::{FinishReason, SamplingParams};
use crate::usage::Usage;

/// OpenAI-compatible chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    /// Legacy function-calling declarations.
    #[serde(default)]
    pub functions: Option<Vec<FunctionSpec>>,
    #[serde(default)]
    pub function_call: Option<serde_json::Value>,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

impl ChatCompletionRequest {
    /// The most recent message with the `user` role.
    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages.iter().rev().find(|m| m.role == "user")
    }

    /// The first declared function, when the request declares any.
    pub fn first_function(&self) -> Option<&FunctionSpec> {
        self.functions.as_ref().and_then(|f| f.first())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    /// Null when the assistant answers with a function call.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments object.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

/// OpenAI-compatible chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    pub fn new(model: String, choices: Vec<ChatChoice>, usage: Usage) -> Self {
        Self {
            id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model,
            choices,
            usage,
        }
    }

    /// Stub answer asking the caller to invoke `function` with no arguments.
    pub fn function_call(model: String, function: &FunctionSpec, usage: Usage) -> Self {
        let choice = ChatChoice {
            index: 0,
            message: ChatMessage::assistant(""),
            finish_reason: Some(FinishReason::FunctionCall),
            function_call: Some(FunctionCall {
                name: function.name.clone(),
                arguments: "{}".to_string(),
            }),
        };
        Self::new(model, vec![choice], usage)
    }
}
