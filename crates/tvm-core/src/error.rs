//! Error types for the TVM core primitives

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while handling keys, claims and tickets
#[derive(Error, Debug)]
pub enum CoreError {
    /// Key pair generation failed
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Key material has the wrong length or is not a valid point
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Signing the canonical claim bytes failed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Ticket could not be decoded into the fixed claim shape
    #[error("Malformed ticket: {0}")]
    MalformedTicket(String),

    /// Claims violate a structural rule (e.g. expiry before issuance)
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    /// Encoding or decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::InvalidKey(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::MalformedTicket(err.to_string())
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        CoreError::Encoding(err.to_string())
    }
}
