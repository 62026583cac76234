use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{
        lifecycle::InvalidTransition,
        queue::{EditError, WindowError},
        turns::TurnError,
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Storage kept rejecting concurrent writes after every retry.
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The actor may not perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Rejected schedule window.
    #[error("invalid schedule window: {0}")]
    InvalidWindow(#[from] WindowError),
    /// Another open queue already covers the same slot.
    #[error("a queue with the same schedule, discipline and groups already exists")]
    AlreadyExists,
    /// Rejected turn operation.
    #[error(transparent)]
    Turn(#[from] TurnError),
}

/// Stable machine-readable discriminant of a failure, sent as `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown queue or participant.
    NotFound,
    /// None of the actor's groups may join.
    Ineligible,
    /// The actor already has a place in the queue.
    AlreadyJoined,
    /// The actor has no place in the queue.
    NotInQueue,
    /// The queue is closed.
    QueueClosed,
    /// The actor does not hold the current turn.
    NotCurrentTurn,
    /// The queue is in the wrong state for the operation.
    InvalidState,
    /// The actor lacks the required role or ownership.
    PermissionDenied,
    /// Bad schedule window.
    InvalidWindow,
    /// Malformed request input.
    InvalidInput,
    /// Duplicate queue slot.
    AlreadyExists,
    /// Concurrent writers kept colliding.
    Conflict,
    /// Missing or malformed actor headers.
    Unauthorized,
    /// Storage is down.
    Unavailable,
}

impl ServiceError {
    /// Discriminant sent to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Degraded => ErrorKind::Unavailable,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::InvalidInput(_) => ErrorKind::InvalidInput,
            ServiceError::InvalidState(_) => ErrorKind::InvalidState,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ServiceError::InvalidWindow(_) => ErrorKind::InvalidWindow,
            ServiceError::AlreadyExists => ErrorKind::AlreadyExists,
            ServiceError::Turn(TurnError::QueueClosed) => ErrorKind::QueueClosed,
            ServiceError::Turn(TurnError::Ineligible) => ErrorKind::Ineligible,
            ServiceError::Turn(TurnError::AlreadyJoined) => ErrorKind::AlreadyJoined,
            ServiceError::Turn(TurnError::NotInQueue) => ErrorKind::NotInQueue,
            ServiceError::Turn(TurnError::NotCurrentTurn) => ErrorKind::NotCurrentTurn,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => ServiceError::Conflict(message),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<EditError> for ServiceError {
    fn from(err: EditError) -> Self {
        let message = err.to_string();
        match err {
            EditError::Window(window) => ServiceError::InvalidWindow(window),
            EditError::WindowLocked | EditError::StartLocked => {
                ServiceError::InvalidState(message)
            }
            EditError::NoEligibleGroups => ServiceError::InvalidInput(message),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Missing or malformed actor context.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Failure raised by a service.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable failure kind.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl AppError {
    /// Discriminant sent to clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::BadRequest(_) => ErrorKind::InvalidInput,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Service(err) => err.kind(),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound | ErrorKind::NotInQueue => StatusCode::NOT_FOUND,
        ErrorKind::Ineligible | ErrorKind::PermissionDenied | ErrorKind::NotCurrentTurn => {
            StatusCode::FORBIDDEN
        }
        ErrorKind::AlreadyJoined
        | ErrorKind::QueueClosed
        | ErrorKind::InvalidState
        | ErrorKind::AlreadyExists
        | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InvalidWindow | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.kind();
        let payload = Json(ErrorBody {
            kind,
            message: self.to_string(),
        });

        (status_for(kind), payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_errors_keep_their_kind_and_status() {
        let err = AppError::from(ServiceError::from(TurnError::NotCurrentTurn));
        assert_eq!(err.kind(), ErrorKind::NotCurrentTurn);
        assert_eq!(status_for(err.kind()), StatusCode::FORBIDDEN);

        let err = AppError::from(ServiceError::from(TurnError::QueueClosed));
        assert_eq!(status_for(err.kind()), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_conflicts_stay_conflicts() {
        let err = ServiceError::from(StorageError::conflict("position taken"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
