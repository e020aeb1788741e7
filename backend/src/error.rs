use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use santa_core::DrawError;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("x-user-id header required")]
    Unauthorized,
    #[error("only the event owner may do this")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Draw(err) => match err {
                DrawError::InsufficientParticipants { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_participants")
                }
                DrawError::DuplicateParticipant(_) => (StatusCode::CONFLICT, "duplicate_participant"),
                DrawError::InvalidAssignment(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "invalid_assignment")
                }
                DrawError::AlreadyDrawn => (StatusCode::CONFLICT, "already_drawn"),
                DrawError::AllDrawn => (StatusCode::CONFLICT, "all_drawn"),
                DrawError::PersistenceFailure(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "persistence_failure")
                }
                DrawError::ConcurrentDrawConflict => (StatusCode::CONFLICT, "concurrent_draw"),
                DrawError::EventNotFound(_) => (StatusCode::NOT_FOUND, "event_not_found"),
                DrawError::ParticipantNotFound(_) => {
                    (StatusCode::NOT_FOUND, "participant_not_found")
                }
                DrawError::DrawClosed => (StatusCode::CONFLICT, "draw_closed"),
            },
            ApiError::Store(StoreError::EventNotFound(_)) => {
                (StatusCode::NOT_FOUND, "event_not_found")
            }
            ApiError::Store(StoreError::ParticipantNotFound(_)) => {
                (StatusCode::NOT_FOUND, "participant_not_found")
            }
            ApiError::Store(StoreError::VersionConflict { .. }) => {
                (StatusCode::CONFLICT, "concurrent_draw")
            }
            ApiError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "persistence_failure"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
