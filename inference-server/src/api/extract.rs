//! Request body extraction with OpenAI-style rejections.

use axum::extract::FromRequest;

use crate::error::Error;

/// `axum::Json` whose rejection is the 422 validation envelope instead of plain text.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct AppJson<T>(pub T);
