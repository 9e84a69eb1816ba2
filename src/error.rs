use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::auth::dto::ApiResponse;

pub type AuthResult<T> = Result<T, AuthError>;

/// Every failure the auth module can hand back to the HTTP boundary.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    /// Unknown email and wrong password collapse into this one variant.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Insufficient privileges")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Email delivery failed: {0}")]
    EmailDelivery(String),

    #[error("Service unavailable")]
    Unavailable(#[source] sqlx::Error),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::DuplicateEmail => StatusCode::CONFLICT,
            AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AuthError::Unavailable(e) => error!(error = %e, "database unavailable"),
            AuthError::Internal(e) => error!(error = ?e, "internal error"),
            _ => {}
        }
        (status, Json(ApiResponse::<()>::error(self.to_string()))).into_response()
    }
}
