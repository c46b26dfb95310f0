//! Shared application state.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::InferenceEngine;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub config: Config,
    /// The one loaded model, shared read-only by every request.
    pub engine: Arc<dyn InferenceEngine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<dyn InferenceEngine>) -> Self {
        Self { config, engine }
    }

    /// Model name echoed in responses: the request's own value, else the served name.
    pub fn response_model(&self, requested: Option<&str>) -> String {
        requested
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.model.served_name())
            .to_string()
    }
}
