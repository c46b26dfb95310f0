//! Text completions endpoint (OpenAI-compatible).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use inference_common::{CompletionRequest, CompletionResponse, TextChoice};

use super::AppJson;
use crate::error::{Error, Result};
use crate::state::AppState;

/// Build the completions router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/completions", post(completions))
}

/// POST /v1/completions - OpenAI-compatible text completion.
async fn completions(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<CompletionRequest>,
) -> Result<Json<CompletionResponse>> {
    let prompt = request
        .first_prompt()
        .ok_or_else(|| Error::InvalidRequest("`prompt` is required".to_string()))?;

    let (generations, usage) =
        super::generate(&state, prompt, &request.sampling, "Text generation failed").await?;

    let choices = generations
        .into_iter()
        .enumerate()
        .map(|(index, generation)| TextChoice {
            text: generation.text,
            index: index as u32,
            logprobs: None,
            finish_reason: Some(generation.finish_reason),
        })
        .collect();

    Ok(Json(CompletionResponse::new(
        state.response_model(request.model.as_deref()),
        choices,
        usage,
    )))
}
