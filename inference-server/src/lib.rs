//! Inference Server - OpenAI-compatible completion API over a locally loaded model.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod state;

use std::any::Any;
use std::sync::Arc;

use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use engine::{CandleEngine, Generation, GenerationParams, InferenceEngine};
pub use error::{Error, Result};
pub use state::AppState;

/// Build the complete application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/v1", api::router())
        .route("/health", get(api::health::health))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Turn a handler panic into the generic 500 envelope.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    Error::Internal(format!("handler panicked: {}", detail)).into_response()
}
