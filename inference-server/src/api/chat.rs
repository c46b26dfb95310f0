//! Chat completions endpoint (OpenAI-compatible).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use inference_common::{
    ChatChoice, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Usage,
};

use super::AppJson;
use crate::error::{Error, Result};
use crate::state::AppState;

/// Build the chat router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat/completions", post(chat_completions))
}

/// POST /v1/chat/completions - OpenAI-compatible chat completion.
///
/// The prompt is the content of the most recent user message. When the request
/// declares functions, a function-call stub is returned and no generation runs.
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<ChatCompletionRequest>,
) -> Result<Json<ChatCompletionResponse>> {
    let user_message = request
        .last_user_message()
        .ok_or_else(|| Error::InvalidRequest("No user messages provided".to_string()))?;
    let content = user_message
        .content
        .as_deref()
        .ok_or_else(|| Error::InvalidRequest("Last user message has no content".to_string()))?;
    let model = state.response_model(request.model.as_deref());

    if let Some(function) = request.first_function() {
        tracing::info!(function = %function.name, "Returning function_call stub");
        let usage = Usage::prompt_only(state.engine.count_tokens(content)?);
        return Ok(Json(ChatCompletionResponse::function_call(
            model, function, usage,
        )));
    }

    if content.is_empty() {
        return Err(Error::InvalidRequest(
            "Last user message has no content".to_string(),
        ));
    }

    let (generations, usage) =
        super::generate(&state, content, &request.sampling, "Chat generation failed").await?;

    let choices = generations
        .into_iter()
        .enumerate()
        .map(|(index, generation)| ChatChoice {
            index: index as u32,
            message: ChatMessage::assistant(generation.text),
            finish_reason: Some(generation.finish_reason),
            function_call: None,
        })
        .collect();

    Ok(Json(ChatCompletionResponse::new(model, choices, usage)))
}
