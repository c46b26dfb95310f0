//! OpenAI-compatible HTTP API.

pub mod chat;
pub mod completions;
mod extract;
pub mod health;
pub mod models;
pub mod tools;

use std::sync::Arc;

use axum::Router;
use inference_common::{SamplingParams, Usage};

use crate::engine::{Generation, GenerationParams};
use crate::error::{Error, Result};
use crate::state::AppState;

pub use extract::AppJson;

/// Build the `/v1` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(completions::router())
        .merge(chat::router())
        .merge(models::router())
        .merge(tools::router())
}

/// Run one generation call for `prompt` and account its token usage.
///
/// Engine failures are logged and replaced by `failure_message` so no backend
/// detail reaches the client.
pub(crate) async fn generate(
    state: &AppState,
    prompt: &str,
    sampling: &SamplingParams,
    failure_message: &str,
) -> Result<(Vec<Generation>, Usage)> {
    sampling.validate().map_err(Error::InvalidRequest)?;
    if sampling.stream() {
        tracing::debug!("stream=true requested, responding with a single body");
    }

    let params = GenerationParams::from_sampling(sampling);
    tracing::debug!(
        engine = state.engine.engine_type(),
        max_new_tokens = params.max_new_tokens,
        n = params.n,
        "Generating"
    );

    let generations = state
        .engine
        .generate(prompt, &params)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "{}", failure_message);
            Error::GenerationFailed(failure_message.to_string())
        })?;

    let prompt_tokens = state.engine.count_tokens(prompt)?;
    let mut completion_tokens = 0;
    for generation in &generations {
        completion_tokens += state.engine.count_tokens(&generation.text)?;
    }

    Ok((generations, Usage::new(prompt_tokens, completion_tokens)))
}
