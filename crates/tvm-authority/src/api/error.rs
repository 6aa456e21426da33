//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::error::AuthorityError;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ticket expired")]
    TicketExpired,

    #[error("Invalid ticket")]
    InvalidTicket,

    #[error("Name already registered: {0}")]
    NameExists(String),

    #[error("Temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    /// HTTP status and stable error code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::AccessDenied(_) => (StatusCode::FORBIDDEN, "ACCESS_DENIED"),
            ApiError::ServiceNotFound(_) => (StatusCode::NOT_FOUND, "SERVICE_NOT_FOUND"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::TicketExpired => (StatusCode::UNAUTHORIZED, "TICKET_EXPIRED"),
            ApiError::InvalidTicket => (StatusCode::UNAUTHORIZED, "INVALID_TICKET"),
            ApiError::NameExists(_) => (StatusCode::CONFLICT, "NAME_EXISTS"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the log
        let message = match &self {
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthorityError> for ApiError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::AccessDenied { .. } => ApiError::AccessDenied(err.to_string()),
            AuthorityError::ServiceNotFound(id) => ApiError::ServiceNotFound(id.to_string()),
            AuthorityError::TicketExpired => ApiError::TicketExpired,
            AuthorityError::InvalidSignature => ApiError::InvalidTicket,
            AuthorityError::NameExists(name) => ApiError::NameExists(name),
            AuthorityError::NotFound(what) => ApiError::NotFound(what),
            AuthorityError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthorityError::Transient(msg) | AuthorityError::Conflict(msg) => {
                ApiError::Unavailable(msg)
            }
            AuthorityError::Configuration(msg) => ApiError::Internal(msg),
        }
    }
}
