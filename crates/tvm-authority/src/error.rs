//! Authority error taxonomy
//!
//! Every failure falls in one of three classes:
//! - policy rejections: client-correctable, never retried automatically
//! - transient failures: persistence or cache trouble, safe to retry
//! - configuration faults: key or encoding failures, fatal to the request

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use tvm_core::{CoreError, ServiceId};

use crate::storage::StorageError;

/// Result type for authority operations
pub type Result<T> = std::result::Result<T, AuthorityError>;

/// Broad class of an `AuthorityError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    PolicyRejection,
    TransientFailure,
    ConfigurationFault,
}

/// Errors returned by the registry, access graph, ticket authority and
/// rotation manager
#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("Access denied: service {source_id} may not call service {target_id}")]
    AccessDenied {
        source_id: ServiceId,
        target_id: ServiceId,
    },

    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),

    #[error("Ticket expired")]
    TicketExpired,

    /// Covers bad signatures, stale keys and malformed tickets alike
    #[error("Invalid ticket")]
    InvalidSignature,

    #[error("Service name already registered: {0}")]
    NameExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Configuration fault: {0}")]
    Configuration(String),
}

impl AuthorityError {
    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            AuthorityError::AccessDenied { .. }
            | AuthorityError::ServiceNotFound(_)
            | AuthorityError::TicketExpired
            | AuthorityError::InvalidSignature
            | AuthorityError::NameExists(_)
            | AuthorityError::NotFound(_)
            | AuthorityError::InvalidInput(_) => ErrorClass::PolicyRejection,
            AuthorityError::Transient(_) | AuthorityError::Conflict(_) => {
                ErrorClass::TransientFailure
            }
            AuthorityError::Configuration(_) => ErrorClass::ConfigurationFault,
        }
    }

    /// True if the caller may retry with backoff
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::TransientFailure
    }
}

impl From<StorageError> for AuthorityError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(what) => AuthorityError::NotFound(what),
            StorageError::AlreadyExists(name) => AuthorityError::NameExists(name),
            StorageError::Conflict(msg) => AuthorityError::Conflict(msg),
            StorageError::Database(msg)
            | StorageError::Connection(msg)
            | StorageError::Serialization(msg) => AuthorityError::Transient(msg),
        }
    }
}

impl From<CoreError> for AuthorityError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedTicket(_) => AuthorityError::InvalidSignature,
            other => AuthorityError::Configuration(other.to_string()),
        }
    }
}

/// Run a collaborator call under a deadline
///
/// A timeout becomes `Transient`, distinct from every policy rejection.
pub(crate) async fn bounded<T, E, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<AuthorityError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Collaborator call timed out"
            );
            Err(AuthorityError::Transient(format!(
                "{} timed out after {:?}",
                operation, limit
            )))
        }
    }
}
