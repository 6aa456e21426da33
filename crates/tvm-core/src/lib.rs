//! # TVM Core
//!
//! Types and cryptographic primitives for the TVM service trust authority.
//!
//! ## Key Concepts
//!
//! - **Service**: a registered microservice, identified by a stable `ServiceId`
//! - **Claims**: "source may call target until expires_at", fixed shape
//! - **Ticket**: claims plus a signature by the source's authority-held key
//! - **Canonicalization**: the one deterministic byte encoding of claims that
//!   is signed at issuance and verified at validation
//!
//! This crate performs no I/O. Storage, policy and transport live in
//! `tvm-authority` and `tvm-bridge`.

pub mod crypto;
pub mod error;
pub mod ticket;
pub mod types;

pub use crypto::{Ed25519KeyManager, KeyManager, KeyPair, PrivateKey, PublicKey};
pub use error::{CoreError, Result};
pub use ticket::{Claims, Ticket, MAX_ENCODED_TICKET_LEN, TICKET_DOMAIN_TAG};
pub use types::{ServiceId, SignatureAlgorithm};

/// Name of the HTTP header that carries an encoded ticket
pub const TICKET_HEADER: &str = "x-tvm-ticket";

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
