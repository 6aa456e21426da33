//! TVM Bridge
//!
//! Service-side adapter for TVM tickets. A calling service obtains tickets
//! from the authority and attaches them to outgoing requests; a receiving
//! service validates the presented ticket and checks it was issued for it.
//!
//! ## Components
//!
//! - **`TvmClient`**: HTTP client for the authority (issue, validate, public key)
//! - **`OutboundTickets`**: per-target ticket holder that sets `x-tvm-ticket`
//! - **`InboundGuard`**: validates the header and enforces the audience
//! - **`LocalVerifier`**: validates in-process against cached public keys
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tvm_bridge::{InboundGuard, LocalVerifier, OutboundTickets, TvmClient};
//! use tvm_core::ServiceId;
//!
//! let client = Arc::new(TvmClient::new("http://tvm.internal:8080")?);
//!
//! // Caller side
//! let outbound = OutboundTickets::new(ServiceId(1), client.clone());
//! outbound.attach(&mut headers, ServiceId(2)).await?;
//!
//! // Callee side
//! let guard = InboundGuard::new(ServiceId(2), Arc::new(LocalVerifier::new(client)));
//! let claims = guard.authorize(&headers).await?;
//! ```

pub mod bridge;
pub mod client;
pub mod error;
pub mod inbound;
pub mod outbound;
pub mod types;
pub mod verifier;

pub use bridge::{PublicKeySource, TicketSource, TicketValidator};
pub use client::TvmClient;
pub use error::{BridgeError, Result};
pub use inbound::InboundGuard;
pub use outbound::OutboundTickets;
pub use types::{IssuedTicket, ServiceKey};
pub use verifier::LocalVerifier;
