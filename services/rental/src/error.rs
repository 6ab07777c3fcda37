//! Custom error types for the rental service
//!
//! Dependency failures are logged with full detail where they happen; the
//! client only ever sees a generic message for them.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::rental::RentalError;

/// Custom error type for the HTTP layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Wrong username or password
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username already taken")]
    UsernameTaken,

    /// No valid session
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unknown box")]
    UnknownBox,

    #[error("Box already rented")]
    BoxAlreadyRented,

    /// Another renter committed the same box first
    #[error("Box was rented by someone else")]
    RentalConflict,

    #[error("Invalid or expired code")]
    InvalidOrExpiredCode,

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::UnknownBox | ApiError::InvalidOrExpiredCode => {
                StatusCode::BAD_REQUEST
            }
            ApiError::InvalidCredentials | ApiError::UsernameTaken | ApiError::RentalConflict => {
                StatusCode::FORBIDDEN
            }
            ApiError::Unauthorized | ApiError::BoxAlreadyRented => StatusCode::UNAUTHORIZED,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (self.status(), body).into_response()
    }
}

impl From<RentalError> for ApiError {
    fn from(err: RentalError) -> Self {
        match err {
            RentalError::UnknownBox(_) => ApiError::UnknownBox,
            RentalError::AlreadyRented(_) => ApiError::BoxAlreadyRented,
            RentalError::InvalidOrExpiredToken => ApiError::InvalidOrExpiredCode,
            RentalError::Unauthenticated => ApiError::Unauthorized,
            RentalError::Conflict(_) => ApiError::RentalConflict,
            RentalError::Store(e) => {
                error!("Store failure during rental: {}", e);
                ApiError::InternalServerError
            }
            RentalError::Encoding(e) => {
                error!("Encoding failure during rental: {}", e);
                ApiError::InternalServerError
            }
        }
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::error::StoreError;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::UsernameTaken.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::BoxAlreadyRented.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidOrExpiredCode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InternalServerError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_are_not_leaked() {
        let err: ApiError = RentalError::Store(StoreError::Corrupt(
            "relation \"boxes\" does not exist".to_string(),
        ))
        .into();

        assert!(matches!(err, ApiError::InternalServerError));
        assert_eq!(err.to_string(), "Internal server error");

        let err: ApiError = RentalError::Store(StoreError::Timeout(Duration::from_secs(5))).into();
        assert!(!err.to_string().contains("5s"));
    }
}
