//! Wire types exchanged with the authority

use serde::{Deserialize, Serialize};
use tvm_core::{Claims, PublicKey, ServiceId};

/// A ticket as returned by the issue endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTicket {
    /// Encoded ticket, sent verbatim in the ticket header
    pub ticket: String,

    /// Expiry (unix seconds)
    pub expires_at: i64,
}

impl IssuedTicket {
    /// Seconds of validity left at `now` (unix seconds); negative once expired
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.expires_at.saturating_sub(now)
    }
}

/// Current verification key of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceKey {
    pub service_id: ServiceId,

    /// Serialized as standard base64
    pub public_key: PublicKey,

    pub key_version: u32,
    pub algorithm: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct IssueRequest {
    pub source_id: ServiceId,
    pub target_id: ServiceId,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValidateRequest<'a> {
    pub ticket: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ValidateResponse {
    pub claims: Claims,
}

/// Error body returned by the authority
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
    pub code: String,
}
