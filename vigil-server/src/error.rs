//! Errors surfaced by the moderation service and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tracing::error;
use vigil_core::api::ErrorBody;
use vigil_core::TargetRef;

use crate::repository::RepositoryError;

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("submission {0} not found")]
    NotFound(TargetRef),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl ModerationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Storage details stay in the log.
            Self::Store(e) => {
                error!("Storage failure: {}", e);
                "Internal storage error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::TargetKind;

    #[test]
    fn test_status_codes() {
        let target = TargetRef::new(TargetKind::Bip, "b-1");
        let cases = [
            (
                ModerationError::Unauthenticated("no token".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ModerationError::Forbidden("self vote".into()),
                StatusCode::FORBIDDEN,
            ),
            (
                ModerationError::InvalidState("archived".into()),
                StatusCode::CONFLICT,
            ),
            (ModerationError::NotFound(target), StatusCode::NOT_FOUND),
            (
                ModerationError::InvalidInput("bad".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ModerationError::Store(RepositoryError::corruption("row")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected, "{:?}", err);
        }
    }

    #[test]
    fn test_not_found_message() {
        let err = ModerationError::NotFound(TargetRef::new(TargetKind::Threat, "t-9"));
        insta::assert_snapshot!(err.to_string(), @"submission threat/t-9 not found");
    }

    #[tokio::test]
    async fn test_store_errors_hide_details() {
        let err = ModerationError::Store(RepositoryError::storage("tally", "disk on fire"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "Internal storage error");
    }
}
