//! TVM Authority
//!
//! The ticket-vending authority for service-to-service calls. It:
//! - Registers services and custodies their Ed25519 key pairs
//! - Keeps the directed access graph between services
//! - Issues short-lived signed tickets for granted pairs
//! - Validates tickets (signature, expiry, live grant)
//! - Rotates service keys with an append-only audit log
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check
//! - `POST /v1/services` - Register a service
//! - `GET /v1/services` - List services
//! - `GET /v1/services/{id}` - Get a service
//! - `PATCH /v1/services/{id}` - Update description or active flag
//! - `GET /v1/services/{id}/public-key` - Current public key
//! - `POST /v1/services/{id}/rotate` - Rotate the service key
//! - `GET /v1/services/{id}/rotations` - Rotation history
//! - `POST /v1/access/grant` - Grant access
//! - `POST /v1/access/revoke` - Revoke access
//! - `POST /v1/access/check` - Check access
//! - `POST /v1/tickets/issue` - Issue a ticket
//! - `POST /v1/tickets/validate` - Validate a ticket

pub mod api;
pub mod config;
pub mod core;
pub mod error;
pub mod keys;
pub mod registry;
pub mod storage;

pub use api::create_router;
pub use api::error::ApiError;
pub use api::state::AppState;
pub use config::AuthorityConfig;
pub use crate::core::{MokaTicketCache, NoopTicketCache, TicketAuthority, TicketCache};
pub use error::{AuthorityError, ErrorClass, Result};
pub use keys::{KeyRotationManager, ServiceLocks};
pub use registry::{AccessGraph, ServiceRegistry};
pub use storage::{GrantStore, MemoryStore, ServiceStore, StorageError};

#[cfg(feature = "postgres")]
pub use storage::PostgresStore;
