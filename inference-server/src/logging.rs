//! Per-request access log.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Middleware emitting one access-log line per request.
///
/// 5xx responses are logged at WARN, everything else at INFO.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        tracing::warn!(%method, %path, status, latency_ms, "Request failed");
    } else {
        tracing::info!(%method, %path, status, latency_ms, "Request served");
    }

    response
}
