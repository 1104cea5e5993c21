use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Body text of every 404, whatever the endpoint.
pub const NOT_FOUND_MESSAGE: &str = "File not found";

/// Failures resolved at the request boundary. Implements [`IntoResponse`].
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("resource not found: {0}")]
    NotFound(String),
    /// An id that would resolve outside of the store.
    #[error("invalid resource id: {0:?}")]
    InvalidId(String),
    #[error("resource i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode {id}: {source}")]
    Encoding {
        id: String,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound(_) | ServeError::InvalidId(_) => StatusCode::NOT_FOUND,
            ServeError::Io(_) | ServeError::Encoding { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServeError::NotFound(_) | ServeError::InvalidId(_) => {
                tracing::debug!(error = %self, "not found");
                NOT_FOUND_MESSAGE.to_string()
            }
            _ => {
                tracing::error!(error = %self, "request failed");
                self.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
