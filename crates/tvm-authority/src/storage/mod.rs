//! Storage abstraction for the authority
//!
//! The registry and the access graph talk to persistence only through the
//! traits in this module, so backends can be swapped and tests can inject
//! doubles. Two backends ship:
//! - `MemoryStore`: in-process maps, the default
//! - `PostgresStore`: durable storage behind the `postgres` feature
//!
//! Backends must enforce name uniqueness themselves (unique constraint or a
//! single write lock) and must apply `rotate_key` atomically.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;
use tvm_core::{KeyPair, PrivateKey, PublicKey, ServiceId};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// A registered service and its current key pair
#[derive(Debug, Clone)]
pub struct Service {
    /// Stable identity, assigned by the store
    pub id: ServiceId,
    /// Unique human-readable name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Current public key
    pub public_key: PublicKey,
    /// Current private key, custodied by the authority
    pub private_key: PrivateKey,
    /// Starts at 1, incremented by every rotation
    pub key_version: u32,
    /// Inactive services can neither obtain nor present tickets
    pub active: bool,
    /// When the service was registered
    pub created_at: DateTime<Utc>,
    /// Last time a ticket was issued for this service
    pub last_access_at: Option<DateTime<Utc>>,
}

/// Input for creating a service row
#[derive(Debug, Clone)]
pub struct NewService {
    pub name: String,
    pub description: String,
    pub key_pair: KeyPair,
    pub created_at: DateTime<Utc>,
}

/// Directed edge: `source_id` may obtain tickets for `target_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub source_id: ServiceId,
    pub target_id: ServiceId,
    pub created_at: DateTime<Utc>,
    /// Edge is treated as absent after this time
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    /// True if the edge still authorizes at `now`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |exp| now < exp)
    }
}

/// Append-only audit entry for a key rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRotationRecord {
    pub service_id: ServiceId,
    pub old_public_key: PublicKey,
    pub new_public_key: PublicKey,
    pub old_key_version: u32,
    pub new_key_version: u32,
    pub rotated_at: DateTime<Utc>,
}

/// Input for an atomic key swap
///
/// Applied only if the stored key version still equals `expected_version`.
#[derive(Debug, Clone)]
pub struct KeyRotation {
    pub service_id: ServiceId,
    pub expected_version: u32,
    pub new_key_pair: KeyPair,
    pub rotated_at: DateTime<Utc>,
}

/// Persistence for services, their keys and the rotation log
#[async_trait]
pub trait ServiceStore: Send + Sync + Debug {
    /// Insert a new service; `AlreadyExists` if the name is taken
    async fn insert_service(&self, service: NewService) -> Result<Service, StorageError>;

    /// Get a service by id
    async fn get_service(&self, id: ServiceId) -> Result<Option<Service>, StorageError>;

    /// Get a service by its unique name
    async fn get_service_by_name(&self, name: &str) -> Result<Option<Service>, StorageError>;

    /// Persist `description` and `active`
    ///
    /// Key material and `last_access_at` are never changed here; the latter
    /// belongs to `touch_service`. Returns false if the row is gone.
    async fn update_service(&self, service: &Service) -> Result<bool, StorageError>;

    /// Set `last_access_at`
    async fn touch_service(&self, id: ServiceId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// All services, ordered by id
    async fn list_services(&self) -> Result<Vec<Service>, StorageError>;

    /// Append the rotation record and swap the active key in one transaction
    ///
    /// `NotFound` if the service does not exist, `Conflict` if its key
    /// version moved since the caller read it.
    async fn rotate_key(&self, rotation: KeyRotation) -> Result<KeyRotationRecord, StorageError>;

    /// Rotation history for a service, newest first
    async fn list_rotations(&self, id: ServiceId) -> Result<Vec<KeyRotationRecord>, StorageError>;

    /// Most recent rotation for a service
    async fn latest_rotation(&self, id: ServiceId) -> Result<Option<KeyRotationRecord>, StorageError>;
}

/// Persistence for access grants
#[async_trait]
pub trait GrantStore: Send + Sync + Debug {
    /// Insert or refresh a grant; re-granting keeps `created_at` and
    /// replaces `expires_at`
    async fn put_grant(&self, grant: AccessGrant) -> Result<(), StorageError>;

    /// Remove a grant; returns whether an edge existed
    async fn delete_grant(&self, source: ServiceId, target: ServiceId) -> Result<bool, StorageError>;

    /// Get a grant regardless of expiry
    async fn get_grant(
        &self,
        source: ServiceId,
        target: ServiceId,
    ) -> Result<Option<AccessGrant>, StorageError>;

    /// All grants whose source is `source`
    async fn list_grants_from(&self, source: ServiceId) -> Result<Vec<AccessGrant>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_grant_liveness() {
        let now = Utc::now();
        let mut grant = AccessGrant {
            source_id: ServiceId(1),
            target_id: ServiceId(2),
            created_at: now,
            expires_at: None,
        };
        assert!(grant.is_live_at(now));

        grant.expires_at = Some(now + Duration::seconds(10));
        assert!(grant.is_live_at(now));
        assert!(!grant.is_live_at(now + Duration::seconds(10)));
    }
}
