//! OpenAI-compatible text completion types.

use serde::{Deserialize, Serialize};

use crate::sampling::{FinishReason, OneOrMany, SamplingParams};
use crate::usage::Usage;

/// OpenAI-compatible text completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub model: Option<String>,
    /// A single prompt or a batch; only the first entry is completed.
    #[serde(default)]
    pub prompt: Option<OneOrMany<String>>,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    /// The prompt to complete, if the request carries a non-empty one.
    pub fn first_prompt(&self) -> Option<&str> {
        self.prompt
            .as_ref()
            .and_then(OneOrMany::first)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChoice {
    pub text: String,
    pub index: u32,
    /// Always null; log probabilities are not computed.
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: Option<FinishReason>,
}

/// OpenAI-compatible text completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    pub usage: Usage,
}

impl CompletionResponse {
    pub fn new(model: String, choices: Vec<TextChoice>, usage: Usage) -> Self {
        Self {
            id: format!("cmpl-{}", uuid::Uuid::new_v4()),
            object: "text_completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model,
            choices,
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_minimal() {
        let json = r#"{"prompt": ["Once upon a time"]}"#;
        let req: CompletionRequest = serde_json::from_str(json).unwrap();
        assert!(req.model.is_none());
        assert_eq!(req.first_prompt(), Some("Once upon a time"));
        assert_eq!(req.sampling.max_new_tokens(), 16);
    }

    #[test]
    fn test_completion_request_accepts_plain_string_prompt() {
        let json = r#"{"prompt": "Hello", "max_tokens": 5, "temperature": 0}"#;
        let req: CompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.first_prompt(), Some("Hello"));
        assert_eq!(req.sampling.max_new_tokens(), 5);
        assert_eq!(req.sampling.temperature(), 0.0);
    }

    #[test]
    fn test_first_prompt_missing_or_empty() {
        let req: CompletionRequest = serde_json::from_str(r#"{"prompt": []}"#).unwrap();
        assert_eq!(req.first_prompt(), None);

        let req: CompletionRequest = serde_json::from_str(r#"{"prompt": [""]}"#).unwrap();
        assert_eq!(req.first_prompt(), None);

        let req: CompletionRequest = serde_json::from_str(r#"{"model": "m"}"#).unwrap();
        assert_eq!(req.first_prompt(), None);
    }

    #[test]
    fn test_batch_prompt_uses_first_entry() {
        let req: CompletionRequest =
            serde_json::from_str(r#"{"prompt": ["first", "second"]}"#).unwrap();
        assert_eq!(req.first_prompt(), Some("first"));
    }

    #[test]
    fn test_completion_response_new() {
        let choice = TextChoice {
            text: " there".to_string(),
            index: 0,
            logprobs: None,
            finish_reason: Some(FinishReason::Stop),
        };
        let response =
            CompletionResponse::new("test-model".to_string(), vec![choice], Usage::new(3, 2));
        assert!(response.id.starts_with("cmpl-"));
        assert_eq!(response.object, "text_completion");
        assert_eq!(response.usage.total_tokens, 5);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert!(json["choices"][0]["logprobs"].is_null());
    }
}
