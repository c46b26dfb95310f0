//! Error types for the inference server.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inference_common::ErrorBody;
use serde_json::{json, Value};

/// Error types for request handling and inference.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request is well-formed JSON but semantically unusable.
    #[error("{0}")]
    InvalidRequest(String),

    /// The request body did not match the expected schema.
    #[error("Validation failed: {message}")]
    Validation { message: String, details: Value },

    /// Generation failed; the message is what the client sees.
    #[error("{0}")]
    GenerationFailed(String),

    #[error("Tool execution failed for {0}")]
    ToolFailed(String),

    #[error("Model load failed: {0}")]
    LoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::GenerationFailed(_)
            | Error::ToolFailed(_)
            | Error::LoadFailed(_)
            | Error::InferenceFailed(_)
            | Error::Tokenization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The envelope sent to the client. Internal failure detail stays in the logs.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            Error::InvalidRequest(message) => ErrorBody::new("invalid_request_error", message),
            Error::Validation { details, .. } => {
                ErrorBody::new("validation_error", "Validation failed").with_details(details.clone())
            }
            Error::GenerationFailed(message) => ErrorBody::new("server_error", message),
            Error::ToolFailed(_) => ErrorBody::new("server_error", self.to_string()),
            Error::LoadFailed(_)
            | Error::InferenceFailed(_)
            | Error::Tokenization(_)
            | Error::Internal(_) => ErrorBody::new("server_error", "Internal server error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status.as_u16(), error = %self, "Request rejected");
        }

        (status, Json(self.to_body())).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        let kind = match &rejection {
            JsonRejection::JsonDataError(_) => "json_data_error",
            JsonRejection::JsonSyntaxError(_) => "json_syntax_error",
            JsonRejection::MissingJsonContentType(_) => "missing_json_content_type",
            JsonRejection::BytesRejection(_) => "body_read_error",
            _ => "invalid_body",
        };
        let message = rejection.body_text();
        Error::Validation {
            details: json!([{ "loc": ["body"], "msg": message, "type": kind }]),
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Validation {
                message: "x".into(),
                details: json!([]),
            }
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            Error::GenerationFailed("Text generation failed".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_request_body() {
        let body = Error::InvalidRequest("`prompt` is required".into()).to_body();
        assert_eq!(body.error.error_type, "invalid_request_error");
        assert_eq!(body.error.message, "`prompt` is required");
        assert!(body.error.details.is_none());
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let body = Error::InferenceFailed("CUDA out of memory".into()).to_body();
        assert_eq!(body.error.error_type, "server_error");
        assert_eq!(body.error.message, "Internal server error");
    }

    #[test]
    fn test_tool_failure_names_tool() {
        let body = Error::ToolFailed("search".into()).to_body();
        assert_eq!(body.error.message, "Tool execution failed for search");
    }

    #[test]
    fn test_validation_body_carries_details() {
        let body = Error::Validation {
            message: "missing field `messages`".into(),
            details: json!([{"loc": ["body"], "msg": "missing field `messages`"}]),
        }
        .to_body();
        assert_eq!(body.error.error_type, "validation_error");
        assert_eq!(body.error.message, "Validation failed");
        assert_eq!(
            body.error.details.unwrap()[0]["msg"],
            "missing field `messages`"
        );
    }
}
