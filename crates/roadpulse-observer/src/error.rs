//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roadpulse_core::persistence::PersistenceError;

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// An invalid or missing query parameter.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The persistence gateway failed or rejected the request.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl ObserverError {
    /// HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidQuery(_) | Self::Persistence(PersistenceError::InvalidRange { .. }) => {
                StatusCode::BAD_REQUEST
            }
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "Observer request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
