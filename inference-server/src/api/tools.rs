//! Tool invocation endpoint.
//!
//! Nothing is executed: the endpoint echoes the tool name and arguments back.

use std::sync::Arc;

use axum::extract::Path;
use axum::routing::post;
use axum::{Json, Router};
use inference_common::ToolResponse;
use serde_json::{Map, Value};

use super::AppJson;
use crate::error::{Error, Result};
use crate::state::AppState;

/// Build the tools router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tools/:tool_name", post(call_tool))
}

/// POST /v1/tools/{tool_name} - Stub tool execution.
async fn call_tool(
    Path(tool_name): Path<String>,
    AppJson(args): AppJson<Map<String, Value>>,
) -> Result<Json<ToolResponse>> {
    let response = execute(&tool_name, &args).map_err(|e| {
        tracing::error!(tool = %tool_name, error = %e, "Tool execution failed");
        Error::ToolFailed(tool_name.clone())
    })?;
    tracing::info!(tool = %tool_name, "Tool executed");
    Ok(Json(response))
}

fn execute(tool_name: &str, args: &Map<String, Value>) -> serde_json::Result<ToolResponse> {
    let rendered = serde_json::to_string(args)?;
    Ok(ToolResponse {
        tool_name: tool_name.to_string(),
        output: format!("Executed {} with args {}", tool_name, rendered),
    })
}
