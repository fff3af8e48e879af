use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Coarse classes callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidState,
    Conflict,
    SelfReference,
}

#[derive(Error, Debug)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Drawing not found")]
    DrawingNotFound,

    #[error("You are not a participant in this room")]
    Unauthorized,

    #[error("Only the host can do that")]
    Forbidden,

    #[error("{0}")]
    InvalidState(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Room is full")]
    RoomFull,

    #[error("You have already rated this drawing")]
    DuplicateRating,

    #[error("You cannot rate yourself")]
    SelfRating,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("Drawing is larger than {0} bytes")]
    PayloadTooLarge(usize),
}

impl RoomError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::RoomNotFound | RoomError::UserNotFound | RoomError::DrawingNotFound => {
                ErrorKind::NotFound
            }
            RoomError::Unauthorized | RoomError::Forbidden => ErrorKind::Forbidden,
            RoomError::InvalidState(_)
            | RoomError::InvalidSettings(_)
            | RoomError::InvalidRating(_)
            | RoomError::PayloadTooLarge(_) => ErrorKind::InvalidState,
            RoomError::RoomFull | RoomError::DuplicateRating => ErrorKind::Conflict,
            RoomError::SelfRating => ErrorKind::SelfReference,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RoomError::RoomNotFound | RoomError::UserNotFound | RoomError::DrawingNotFound => {
                StatusCode::NOT_FOUND
            }
            RoomError::Unauthorized | RoomError::Forbidden => StatusCode::FORBIDDEN,
            // the join surface reports a full room as 403
            RoomError::RoomFull => StatusCode::FORBIDDEN,
            RoomError::DuplicateRating => StatusCode::CONFLICT,
            RoomError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RoomError::InvalidState(_)
            | RoomError::InvalidSettings(_)
            | RoomError::InvalidRating(_)
            | RoomError::SelfRating => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
