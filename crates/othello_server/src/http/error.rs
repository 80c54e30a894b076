//! Mapping of domain errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::store::StoreErrorKind;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error kind.
    pub kind: String,
    /// Human-readable description.
    pub error: String,
}

/// Error returned by route handlers.
#[derive(Debug, Clone, derive_more::Display)]
#[display("{}: {}", status, body.error)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// Creates an error with an explicit status.
    pub fn new(status: StatusCode, kind: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                kind: kind.to_string(),
                error: error.into(),
            },
        }
    }

    /// 400 with `kind` `bad_request`.
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", error)
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response body.
    pub fn body(&self) -> &ErrorBody {
        &self.body
    }
}

/// Status and kind for a game error.
pub fn classify(err: &GameError) -> (StatusCode, &'static str) {
    match err {
        GameError::IllegalMove(_) => (StatusCode::BAD_REQUEST, "illegal_move"),
        GameError::NotYourTurn { .. } => (StatusCode::CONFLICT, "not_your_turn"),
        GameError::GameFull(_) => (StatusCode::CONFLICT, "game_full"),
        GameError::GameNotFound(_) => (StatusCode::NOT_FOUND, "game_not_found"),
        GameError::UnknownParticipant(_) => (StatusCode::UNAUTHORIZED, "unknown_user"),
        GameError::ParticipantNotAuthorized(_) => (StatusCode::FORBIDDEN, "not_authorized"),
        GameError::StaleVersion { .. } => (StatusCode::CONFLICT, "stale_version"),
        GameError::GameNotOver => (StatusCode::CONFLICT, "game_not_over"),
        GameError::RejectedWrite(_) => (StatusCode::BAD_REQUEST, "rejected_write"),
        GameError::Store(e) if e.kind == StoreErrorKind::Conflict => {
            (StatusCode::CONFLICT, "stale_version")
        }
        GameError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        GameError::InvariantViolation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invariant"),
        GameError::Propagation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "propagation"),
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let (status, kind) = classify(&err);
        Self::new(status, kind, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
