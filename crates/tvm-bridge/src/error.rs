//! Error types for the TVM bridge

use thiserror::Error;
use tvm_core::{CoreError, ServiceId};

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while obtaining or checking tickets
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Request carried no ticket header
    #[error("Missing ticket header")]
    MissingTicket,

    /// Ticket or response could not be parsed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Ticket is past its expiry
    #[error("Ticket expired")]
    Expired,

    /// Signature does not verify under the source's key
    #[error("Invalid ticket signature")]
    InvalidSignature,

    /// Ticket was issued for a different service
    #[error("Ticket audience mismatch: expected {expected}, got {actual}")]
    WrongAudience {
        expected: ServiceId,
        actual: ServiceId,
    },

    /// Authority refused because no grant exists
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Authority does not know the service
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Authority rejected the request for another reason
    #[error("Rejected by authority ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Authority temporarily unavailable; safe to retry
    #[error("Authority unavailable: {0}")]
    Unavailable(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Map an authority error body to a bridge error
    pub fn from_api(code: &str, message: String) -> Self {
        match code {
            "ACCESS_DENIED" => BridgeError::AccessDenied(message),
            "SERVICE_NOT_FOUND" => BridgeError::ServiceNotFound(message),
            "TICKET_EXPIRED" => BridgeError::Expired,
            "INVALID_TICKET" => BridgeError::InvalidSignature,
            "UNAVAILABLE" => BridgeError::Unavailable(message),
            other => BridgeError::Rejected {
                code: other.to_string(),
                message,
            },
        }
    }

    /// True if the caller may retry with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Unavailable(_) | BridgeError::HttpError(_))
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::InvalidFormat(err.to_string())
    }
}

impl From<CoreError> for BridgeError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedTicket(msg) | CoreError::InvalidClaims(msg) => {
                BridgeError::InvalidFormat(msg)
            }
            CoreError::InvalidKey(msg) => BridgeError::InvalidFormat(format!("public key: {}", msg)),
            other => BridgeError::Internal(other.to_string()),
        }
    }
}
