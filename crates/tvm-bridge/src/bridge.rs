//! Seams between services and the authority
//!
//! Outbound and inbound adapters depend on these traits rather than on the
//! HTTP client, so they can run against test doubles or an in-process
//! authority.

use async_trait::async_trait;
use tvm_core::{Claims, ServiceId};

use crate::error::Result;
use crate::types::{IssuedTicket, ServiceKey};

/// Obtains tickets for outbound calls
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Request a ticket for `source` to call `target`
    async fn issue(&self, source: ServiceId, target: ServiceId) -> Result<IssuedTicket>;
}

/// Checks tickets presented on inbound calls
#[async_trait]
pub trait TicketValidator: Send + Sync {
    /// Validate an encoded ticket and return its claims
    ///
    /// Does not check the audience; callers compare `target_id` with their
    /// own identity.
    async fn validate(&self, encoded: &str) -> Result<Claims>;
}

/// Supplies services' current verification keys
#[async_trait]
pub trait PublicKeySource: Send + Sync {
    async fn public_key(&self, service: ServiceId) -> Result<ServiceKey>;
}
