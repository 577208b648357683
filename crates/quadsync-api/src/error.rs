//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use quadsync_core::EngineError;

/// Error type for the HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Missing or invalid bearer token.
    #[error("authentication required")]
    Unauthorized,
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Engine(e) => match e {
                EngineError::SourceUnavailable { .. } => {
                    (StatusCode::BAD_GATEWAY, "source_unavailable")
                }
                EngineError::SourceRejected { .. } => (StatusCode::BAD_GATEWAY, "source_rejected"),
                EngineError::RunInProgress => (StatusCode::CONFLICT, "run_in_progress"),
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EngineError::AlreadyResolved(_) => (StatusCode::CONFLICT, "already_resolved"),
                EngineError::InvalidArgument(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_argument")
                }
                EngineError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
                EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // The internal detail stays in the log, not the response body.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
            "an internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadsync_core::ConflictId;

    #[test]
    fn test_taxonomy_maps_to_status() {
        let cases = [
            (
                ApiError::Engine(EngineError::RunInProgress),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Engine(EngineError::NotFound(ConflictId(1))),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Engine(EngineError::AlreadyResolved(ConflictId(1))),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Engine(EngineError::InvalidArgument("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Engine(EngineError::Forbidden),
                StatusCode::FORBIDDEN,
            ),
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_and_code().0, status);
        }
    }

    #[test]
    fn test_internal_detail_not_leaked() {
        let err = ApiError::Engine(EngineError::Internal("connection string".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
