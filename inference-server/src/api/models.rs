//! Models endpoint (OpenAI-compatible).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Build the models router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/models", get(list_models))
}

/// OpenAI-compatible model list response.
#[derive(Debug, Serialize)]
struct ModelsResponse {
    object: &'static str,
    data: Vec<ModelData>,
}

#[derive(Debug, Serialize)]
struct ModelData {
    id: String,
    object: &'static str,
    created: i64,
    owned_by: &'static str,
}

/// GET /v1/models - List the served model.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        object: "list",
        data: vec![ModelData {
            id: state.config.model.served_name().to_string(),
            object: "model",
            created: 0,
            owned_by: "local",
        }],
    })
}
